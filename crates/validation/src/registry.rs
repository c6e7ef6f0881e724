use crate::errors::Error;

/// Define name-keyed registry structures and related implementations.
///
/// A registry exclusively owns its entries, preserves insertion order, and
/// rejects duplicate names. Everything else in the model refers to registry
/// entries by name, so a registry lookup is the only way to traverse an
/// inter-entity edge.
macro_rules! registries {
    ($(
        registry $Registry:ident ( name $Name:ty, entry $Entry:ty, kind $kind:literal )
    )*) => {
        $(
        #[derive(Debug, Default)]
        pub struct $Registry(indexmap::IndexMap<$Name, $Entry>);

        impl $Registry {
            pub fn new() -> Self {
                Self(indexmap::IndexMap::new())
            }

            /// Insert |entry| under |name|, rejecting duplicates.
            pub fn insert(&mut self, name: $Name, entry: $Entry) -> Result<(), Error> {
                match self.0.entry(name) {
                    indexmap::map::Entry::Occupied(occupied) => Err(Error::DuplicateName {
                        kind: $kind,
                        name: occupied.key().to_string(),
                    }),
                    indexmap::map::Entry::Vacant(vacant) => {
                        vacant.insert(entry);
                        Ok(())
                    }
                }
            }

            pub fn get(&self, name: &str) -> Option<&$Entry> {
                self.0.get(name)
            }

            /// Look up |name|, failing with UnknownReference if absent.
            pub fn must_get(&self, name: &str) -> Result<&$Entry, Error> {
                self.get(name).ok_or_else(|| Error::UnknownReference {
                    kind: $kind,
                    name: name.to_string(),
                })
            }

            pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut $Entry> {
                self.0.get_mut(name)
            }
        }

        impl std::ops::Deref for $Registry {
            type Target = indexmap::IndexMap<$Name, $Entry>;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        // Equality is order-aware: two registries holding the same entries
        // in different declaration orders are different registries.
        impl PartialEq for $Registry {
            fn eq(&self, other: &Self) -> bool {
                self.0.len() == other.0.len()
                    && self.0.iter().zip(other.0.iter()).all(|(l, r)| l == r)
            }
        }
        )*
    }
}

pub(crate) use registries;

#[cfg(test)]
mod test {
    use super::super::errors::Error;
    use models::names;

    registries!(
        registry Widgets ( name names::Collection, entry u32, kind "widget" )
    );

    #[test]
    fn test_insertion_order_and_duplicates() {
        let mut widgets = Widgets::new();
        widgets.insert(names::Collection::new("b"), 1).unwrap();
        widgets.insert(names::Collection::new("a"), 2).unwrap();

        let keys: Vec<_> = widgets.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);

        match widgets.insert(names::Collection::new("b"), 3) {
            Err(Error::DuplicateName { kind: "widget", name }) => assert_eq!(name, "b"),
            out => panic!("expected DuplicateName, got {out:?}"),
        }
    }

    #[test]
    fn test_order_aware_equality() {
        let mut l = Widgets::new();
        l.insert(names::Collection::new("a"), 1).unwrap();
        l.insert(names::Collection::new("b"), 2).unwrap();

        let mut r = Widgets::new();
        r.insert(names::Collection::new("b"), 2).unwrap();
        r.insert(names::Collection::new("a"), 1).unwrap();

        assert_ne!(l, r);
    }
}
