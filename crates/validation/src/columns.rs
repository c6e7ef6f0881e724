use crate::errors::Error;
use crate::model::{Column, ColumnSet, CompoundTypes, Cvs, Patterns};
use models::{ColumnDecl, DefaultValue, Restriction};

/// Resolution context for column restrictions: every CV restriction must
/// resolve to a registered CV, every pattern restriction to a registered
/// pattern, and every compound restriction to a registered compound type.
pub struct Restrictions<'m> {
    pub patterns: &'m Patterns,
    pub cvs: &'m Cvs,
    pub compound_types: &'m CompoundTypes,
}

impl<'m> Restrictions<'m> {
    fn check(&self, restriction: &Restriction) -> Result<(), Error> {
        match restriction {
            Restriction::Cv(name) => self.cvs.must_get(name).map(|_| ()),
            Restriction::Pattern(name) => self.patterns.must_get(name).map(|_| ()),
            Restriction::Compound(name) => self.compound_types.must_get(name).map(|_| ()),
        }
    }
}

/// Resolve one declared column, checking its restriction.
pub fn build_column(decl: &ColumnDecl, refs: &Restrictions) -> Result<Column, Error> {
    if let Some(restriction) = &decl.column_type.restriction {
        refs.check(restriction)?;
    }
    Ok(Column {
        name: decl.name.clone(),
        description: decl.description.clone(),
        annotations: decl.annotations.clone(),
        column_type: decl.column_type.clone(),
        reference: None,
    })
}

/// Resolve a sequence of declared columns into a fresh set.
pub fn build_set(
    owner: &str,
    decls: &[ColumnDecl],
    refs: &Restrictions,
) -> Result<ColumnSet, Error> {
    let mut set = ColumnSet::new();
    for decl in decls {
        set.insert_new(owner, build_column(decl, refs)?)?;
    }
    Ok(set)
}

/// Check that every default-column reference names a sibling of the
/// finished set. Runs after merging, so a default may refer to an
/// inherited or imported sibling.
pub fn check_defaults(set: &ColumnSet) -> Result<(), Error> {
    for (_, column) in set.iter() {
        if let Some(DefaultValue::Column(sibling)) = &column.column_type.default {
            if set.get(sibling).is_none() {
                return Err(Error::UnknownReference {
                    kind: "default column",
                    name: sibling.to_string(),
                });
            }
        }
    }
    Ok(())
}
