#![allow(missing_docs)]

use std::collections::HashMap;

use facet::Facet;
use facet_env::{DefaultFallback, EnvErrorKind, Loader, Source, SourceError};

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

#[derive(Facet, Debug, PartialEq, Default)]
struct Server {
    #[facet(env = "HOST")]
    host: String,
    #[facet(env = "PORT")]
    port: u16,
}

#[test]
fn populate_preserves_existing_values() {
    let mut server = Server {
        host: "kept.example.com".to_string(),
        port: 0,
    };

    let loader = Loader::new().source(source(&[
        ("HOST", "ignored.example.com"),
        ("PORT", "8080"),
    ]));
    loader.populate(&mut server).unwrap();

    // Non-default fields stay; zero-state fields are filled in.
    assert_eq!(server.host, "kept.example.com");
    assert_eq!(server.port, 8080);
}

#[test]
fn override_existing_replaces_values() {
    let mut server = Server {
        host: "old.example.com".to_string(),
        port: 1000,
    };

    let loader = Loader::new().override_existing(true).source(source(&[
        ("HOST", "new.example.com"),
        ("PORT", "8080"),
    ]));
    loader.populate(&mut server).unwrap();

    assert_eq!(server.host, "new.example.com");
    assert_eq!(server.port, 8080);
}

#[test]
fn override_without_a_value_keeps_the_field() {
    let mut server = Server {
        host: "old.example.com".to_string(),
        port: 1000,
    };

    let loader = Loader::new()
        .override_existing(true)
        .source(source(&[("PORT", "8080")]));
    loader.populate(&mut server).unwrap();

    assert_eq!(server.host, "old.example.com");
    assert_eq!(server.port, 8080);
}

#[test]
fn default_fallback_only_if_unset() {
    #[derive(Facet, Debug, PartialEq, Default)]
    struct Tunable {
        #[facet(env = "LEVEL,default=5")]
        level: u32,
    }

    let mut tunable = Tunable { level: 9 };
    let loader = Loader::new()
        .override_existing(true)
        .source(source(&[]));
    loader.populate(&mut tunable).unwrap();

    // The key is absent and the field already holds a value, so the declared
    // default does not apply.
    assert_eq!(tunable.level, 9);
}

#[test]
fn default_fallback_always_on_absent() {
    #[derive(Facet, Debug, PartialEq, Default)]
    struct Tunable {
        #[facet(env = "LEVEL,default=5")]
        level: u32,
    }

    let mut tunable = Tunable { level: 9 };
    let loader = Loader::new()
        .override_existing(true)
        .default_fallback(DefaultFallback::AlwaysOnAbsent)
        .source(source(&[]));
    loader.populate(&mut tunable).unwrap();

    assert_eq!(tunable.level, 5);
}

#[test]
fn excluded_fields_are_never_looked_up() {
    #[derive(Facet, Debug, PartialEq, Default)]
    struct Sparse {
        #[facet(env = "-")]
        excluded: String,
        #[facet(env = "")]
        unnamed: String,
        #[facet(env = "TAGGED")]
        tagged: String,
    }

    let loader = Loader::new().source(source(&[
        ("-", "never"),
        ("TAGGED", "yes"),
    ]));
    let sparse: Sparse = loader.load().unwrap();

    assert_eq!(sparse.excluded, "");
    assert_eq!(sparse.unnamed, "");
    assert_eq!(sparse.tagged, "yes");
}

#[test]
fn non_struct_target_is_a_structural_error() {
    let loader = Loader::new().source(source(&[]));
    let err = loader.load::<u32>().unwrap_err();

    assert!(matches!(err.kind(), EnvErrorKind::NotAStruct(_)));
}

#[test]
fn failed_populate_leaves_target_untouched() {
    let mut server = Server {
        host: "before".to_string(),
        port: 0,
    };

    let loader = Loader::new().source(source(&[("PORT", "not-a-port")]));
    loader.populate(&mut server).unwrap_err();

    assert_eq!(server.host, "before");
    assert_eq!(server.port, 0);
}

#[test]
fn empty_value_is_a_skip_not_an_error() {
    let mut server = Server {
        host: "kept".to_string(),
        port: 0,
    };

    let loader = Loader::new()
        .override_existing(true)
        .source(source(&[("HOST", "")]));
    loader.populate(&mut server).unwrap();

    assert_eq!(server.host, "kept");
}

#[test]
fn loader_is_reusable_across_targets() {
    let loader = Loader::new().source(source(&[
        ("HOST", "a.example.com"),
        ("PORT", "80"),
    ]));

    let first: Server = loader.load().unwrap();
    let second: Server = loader.load().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.host, "a.example.com");
}
