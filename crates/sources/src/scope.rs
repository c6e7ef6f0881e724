use std::fmt;

/// Scope is a stack-allocated chain of location context, threaded through
/// the reader so that errors can say *where* in the document they arose.
/// Rendered like `/concept-domain[s]/concept[sample]/column[id]`.
#[derive(Copy, Clone)]
pub struct Scope<'a> {
    parent: Option<&'a Scope<'a>>,
    segment: Segment<'a>,
}

#[derive(Copy, Clone)]
enum Segment<'a> {
    Root,
    Element(&'a str),
    Named(&'a str, &'a str),
    Item(&'a str, usize),
}

impl<'a> Scope<'a> {
    pub fn root() -> Scope<'a> {
        Scope {
            parent: None,
            segment: Segment::Root,
        }
    }

    /// Push an element without a distinguishing name.
    pub fn push(&'a self, element: &'a str) -> Scope<'a> {
        Scope {
            parent: Some(self),
            segment: Segment::Element(element),
        }
    }

    /// Push an element identified by its name attribute.
    pub fn push_named(&'a self, element: &'a str, name: &'a str) -> Scope<'a> {
        Scope {
            parent: Some(self),
            segment: Segment::Named(element, name),
        }
    }

    /// Push an element identified by its ordinal among siblings.
    pub fn push_item(&'a self, element: &'a str, index: usize) -> Scope<'a> {
        Scope {
            parent: Some(self),
            segment: Segment::Item(element, index),
        }
    }
}

impl<'a> fmt::Display for Scope<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(parent) = self.parent {
            parent.fmt(f)?;
        }
        match self.segment {
            Segment::Root => Ok(()),
            Segment::Element(element) => write!(f, "/{element}"),
            Segment::Named(element, name) => write!(f, "/{element}[{name}]"),
            Segment::Item(element, index) => write!(f, "/{element}[{index}]"),
        }
    }
}
