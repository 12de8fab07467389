#![allow(missing_docs)]

use std::collections::HashMap;

use facet::Facet;
use facet_env::{EnvErrorKind, Loader, Source, SourceError};

#[derive(Default)]
struct MapSource(HashMap<&'static str, &'static str>);

impl Source for MapSource {
    fn lookup(&self, key: &str) -> Result<Option<String>, SourceError> {
        Ok(self.0.get(key).map(|value| value.to_string()))
    }
}

fn source(pairs: &[(&'static str, &'static str)]) -> MapSource {
    MapSource(pairs.iter().copied().collect())
}

#[test]
fn vec_splits_on_spaces() {
    #[derive(Facet, Debug, PartialEq)]
    struct Lists {
        #[facet(env = "STRINGS")]
        strings: Vec<String>,
        #[facet(env = "INTS")]
        ints: Vec<i64>,
    }

    let loader = Loader::new().source(source(&[
        ("STRINGS", "one two three"),
        ("INTS", "1 0x10 -3"),
    ]));
    let lists: Lists = loader.load().unwrap();

    assert_eq!(lists.strings, vec!["one", "two", "three"]);
    assert_eq!(lists.ints, vec![1, 16, -3]);
}

#[test]
fn vec_default_is_coerced_like_a_value() {
    #[derive(Facet, Debug, PartialEq)]
    struct Defaulted {
        #[facet(env = "ITEMS,default=x1 x2 x3")]
        items: Vec<String>,
    }

    let loader = Loader::new().source(source(&[]));
    let defaulted: Defaulted = loader.load().unwrap();

    assert_eq!(defaulted.items, vec!["x1", "x2", "x3"]);
}

#[test]
fn array_needs_exact_token_count() {
    #[derive(Facet, Debug, PartialEq)]
    struct Fixed {
        #[facet(env = "TRIPLE")]
        triple: [i32; 3],
    }

    let exact = Loader::new().source(source(&[("TRIPLE", "1 2 3")]));
    let fixed: Fixed = exact.load().unwrap();
    assert_eq!(fixed.triple, [1, 2, 3]);

    let short = Loader::new().source(source(&[("TRIPLE", "1 2")]));
    let err = short.load::<Fixed>().unwrap_err();
    assert!(err.to_string().contains("not enough elements"), "{err}");

    let long = Loader::new().source(source(&[("TRIPLE", "1 2 3 4")]));
    assert!(long.load::<Fixed>().is_err());
}

#[test]
fn map_pairs_split_on_first_colon() {
    #[derive(Facet, Debug, PartialEq)]
    struct Mapped {
        #[facet(env = "MAP")]
        map: HashMap<String, String>,
    }

    let loader = Loader::new().source(source(&[("MAP", "a1:b1 a2:b2:b2")]));
    let mapped: Mapped = loader.load().unwrap();

    assert_eq!(mapped.map.len(), 2);
    assert_eq!(mapped.map["a1"], "b1");
    assert_eq!(mapped.map["a2"], "b2:b2");
}

#[test]
fn map_duplicate_keys_last_wins() {
    #[derive(Facet, Debug, PartialEq)]
    struct Mapped {
        #[facet(env = "MAP")]
        map: HashMap<String, i32>,
    }

    let loader = Loader::new().source(source(&[("MAP", "a:1 b:2 a:3")]));
    let mapped: Mapped = loader.load().unwrap();

    assert_eq!(mapped.map.len(), 2);
    assert_eq!(mapped.map["a"], 3);
    assert_eq!(mapped.map["b"], 2);
}

#[test]
fn map_pair_without_colon_is_an_error() {
    #[derive(Facet, Debug, PartialEq)]
    struct Mapped {
        #[facet(env = "MAP")]
        map: HashMap<String, String>,
    }

    let loader = Loader::new().source(source(&[("MAP", "a:1 nocolon")]));
    let err = loader.load::<Mapped>().unwrap_err();

    assert!(matches!(err.kind(), EnvErrorKind::Assign { .. }));
    assert!(err.to_string().contains("invalid map items"), "{err}");
}

#[test]
fn elements_can_be_wrapped() {
    #[derive(Facet, Debug, PartialEq)]
    struct Wrapped {
        #[facet(env = "MAYBE_ITEMS")]
        maybe_items: Option<Vec<i32>>,
        #[facet(env = "ITEM_OPTS")]
        item_opts: Vec<Option<String>>,
        #[facet(env = "BOXES")]
        boxes: Vec<Box<u8>>,
    }

    let loader = Loader::new().source(source(&[
        ("MAYBE_ITEMS", "1 2"),
        ("ITEM_OPTS", "a b"),
        ("BOXES", "7 8"),
    ]));
    let wrapped: Wrapped = loader.load().unwrap();

    assert_eq!(wrapped.maybe_items, Some(vec![1, 2]));
    assert_eq!(
        wrapped.item_opts,
        vec![Some("a".to_string()), Some("b".to_string())]
    );
    assert_eq!(wrapped.boxes, vec![Box::new(7), Box::new(8)]);
}

#[test]
fn typed_map_values_are_coerced() {
    #[derive(Facet, Debug, PartialEq)]
    struct Mapped {
        #[facet(env = "LIMITS")]
        limits: HashMap<String, u64>,
    }

    let loader = Loader::new().source(source(&[("LIMITS", "small:10 large:0x100")]));
    let mapped: Mapped = loader.load().unwrap();

    assert_eq!(mapped.limits["small"], 10);
    assert_eq!(mapped.limits["large"], 256);
}

#[test]
fn absent_collections_stay_empty() {
    #[derive(Facet, Debug, PartialEq)]
    struct Empty {
        #[facet(env = "ITEMS")]
        items: Vec<String>,
        #[facet(env = "MAP")]
        map: HashMap<String, String>,
    }

    let loader = Loader::new().source(source(&[]));
    let empty: Empty = loader.load().unwrap();

    assert!(empty.items.is_empty());
    assert!(empty.map.is_empty());
}
