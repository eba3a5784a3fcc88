use std::collections::HashMap;

/// OR over the last value of every source seen. Sources are never evicted.
#[derive(Debug, Clone, Default)]
pub struct AnyActive {
    inputs: HashMap<String, bool>,
}

impl AnyActive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, source: impl Into<String>, value: bool) -> bool {
        self.inputs.insert(source.into(), value);
        self.value()
    }

    pub fn value(&self) -> bool {
        self.inputs.values().any(|active| *active)
    }

    pub fn get(&self, source: &str) -> Option<bool> {
        self.inputs.get(source).copied()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ors_over_all_sources() {
        let mut any = AnyActive::new();
        assert!(!any.value());

        assert!(!any.report("a", false));
        assert!(!any.report("b", false));
        assert!(any.report("a", true));
        assert!(!any.report("a", false));
    }

    #[test]
    fn silent_source_keeps_contributing() {
        let mut any = AnyActive::new();
        any.report("bath/heating", true);

        for _ in 0..3 {
            assert!(any.report("kitchen/heating", false));
        }

        assert!(!any.report("bath/heating", false));
        assert_eq!(any.len(), 2);
    }

    #[test]
    fn new_source_counts_in_same_call() {
        let mut any = AnyActive::new();
        any.report("a", false);
        assert!(any.report("b", true));
        assert_eq!(any.get("b"), Some(true));
        assert_eq!(any.get("c"), None);
    }
}
