//! Result of latest-version calculation

/// Versions selected for one chronology under one coordinate
///
/// A contradiction is a normal outcome, not an error: two or more versions
/// tied under the ranking and none can be preferred.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Latest<V> {
    /// No version satisfies the coordinate
    Empty,
    /// Exactly one version wins
    Single(V),
    /// Tied versions, in chronology order (always two or more)
    Contradiction(Vec<V>),
}

impl<V> Latest<V> {
    /// True unless empty
    pub fn is_present(&self) -> bool {
        !matches!(self, Latest::Empty)
    }

    /// True for an unresolved tie
    pub fn is_contradicted(&self) -> bool {
        matches!(self, Latest::Contradiction(_))
    }

    /// The single winning version
    pub fn value(&self) -> Option<&V> {
        match self {
            Latest::Single(v) => Some(v),
            _ => None,
        }
    }

    /// Tied versions, empty unless contradicted
    pub fn contradictions(&self) -> &[V] {
        match self {
            Latest::Contradiction(vs) => vs,
            _ => &[],
        }
    }

    /// Number of selected versions
    pub fn len(&self) -> usize {
        match self {
            Latest::Empty => 0,
            Latest::Single(_) => 1,
            Latest::Contradiction(vs) => vs.len(),
        }
    }

    /// True if no version was selected
    pub fn is_empty(&self) -> bool {
        !self.is_present()
    }

    /// Apply `f` to every selected version
    pub fn map<U>(self, mut f: impl FnMut(V) -> U) -> Latest<U> {
        match self {
            Latest::Empty => Latest::Empty,
            Latest::Single(v) => Latest::Single(f(v)),
            Latest::Contradiction(vs) => Latest::Contradiction(vs.into_iter().map(f).collect()),
        }
    }

    /// Every selected version
    pub fn into_vec(self) -> Vec<V> {
        match self {
            Latest::Empty => Vec::new(),
            Latest::Single(v) => vec![v],
            Latest::Contradiction(vs) => vs,
        }
    }

    /// Build from tied candidates
    pub(crate) fn from_tied(mut tied: Vec<V>) -> Self {
        if tied.len() > 1 {
            return Latest::Contradiction(tied);
        }
        match tied.pop() {
            Some(v) => Latest::Single(v),
            None => Latest::Empty,
        }
    }
}

impl<V> Default for Latest<V> {
    fn default() -> Self {
        Latest::Empty
    }
}

impl<V: Clone> Latest<&V> {
    /// Owned copy of the selected versions
    pub fn cloned(&self) -> Latest<V> {
        match self {
            Latest::Empty => Latest::Empty,
            Latest::Single(v) => Latest::Single((*v).clone()),
            Latest::Contradiction(vs) => {
                Latest::Contradiction(vs.iter().map(|v| (*v).clone()).collect())
            }
        }
    }
}
