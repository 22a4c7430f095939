//! Hashed collection types for Vellum.
//!
//! Key tables in the texture cache are hashed with AHash, which is noticeably
//! faster than SipHash for the short path strings used as texture keys.

pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_string_keys() {
        let mut map = HashMap::new();
        map.insert(String::from("ui/icon/000000/000001.tex"), 1u32);
        assert_eq!(map.get("ui/icon/000000/000001.tex"), Some(&1));
        assert_eq!(map.get("ui/icon/000000/000002.tex"), None);
    }

    #[test]
    fn test_hashset_dedup() {
        let mut set = HashSet::new();
        assert!(set.insert("a.png"));
        assert!(!set.insert("a.png"));
        assert_eq!(set.len(), 1);
    }
}
