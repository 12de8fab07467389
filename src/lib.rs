#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use std::error::Error;
use std::fmt::{self, Display};

use facet_core::{Def, Facet, Field, FieldAttribute, Shape, Type, UserType};
use facet_reflect::{HasFields, Partial, Peek, ReflectError, ScalarType};

mod coerce;
mod source;

pub use source::{EnvSource, Source, SourceError};

/// Error type for environment population.
#[derive(Debug)]
pub struct EnvError {
    kind: EnvErrorKind,
}

impl EnvError {
    /// Returns a reference to the error kind for detailed error inspection.
    pub fn kind(&self) -> &EnvErrorKind {
        &self.kind
    }
}

impl Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = &self.kind;
        write!(f, "{kind}")
    }
}
impl Error for EnvError {}

impl<K: Into<EnvErrorKind>> From<K> for EnvError {
    fn from(value: K) -> Self {
        let kind = value.into();
        EnvError { kind }
    }
}

/// Detailed classification of population errors.
#[derive(Debug)]
#[non_exhaustive]
pub enum EnvErrorKind {
    /// The population target's shape is not a struct.
    NotAStruct(&'static Shape),
    /// A field carries a malformed tag declaration.
    InvalidTag {
        /// The field whose tag is malformed.
        field: &'static str,
        /// The raw tag text.
        tag: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// A looked-up value could not be assigned to its field.
    Assign {
        /// The composed lookup key.
        key: String,
        /// The fully-qualified field path (`Record.field`).
        field_path: String,
        /// The field's type name.
        type_name: &'static str,
        /// The raw value that failed to convert.
        value: String,
        /// The underlying conversion failure.
        cause: Box<EnvError>,
    },
    /// A raw value does not fit the target shape.
    Invalid {
        /// Human-readable description of the mismatch.
        message: String,
    },
    /// Every self-setting capability of the target type rejected the value.
    Setters {
        /// The individual failures, in the order the capabilities were tried.
        errors: Vec<EnvError>,
    },
    /// The source capability failed to look up a key.
    Source {
        /// The composed lookup key.
        key: String,
        /// The backend failure.
        cause: SourceError,
    },
    /// Error from the reflection system during population.
    Reflect(ReflectError),
}

impl Display for EnvErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvErrorKind::NotAStruct(shape) => {
                write!(f, "expected a struct to populate, got {shape}")
            }
            EnvErrorKind::InvalidTag { field, tag, reason } => {
                write!(f, "field '{field}': invalid tag '{tag}': {reason}")
            }
            EnvErrorKind::Assign {
                key,
                field_path,
                type_name,
                value,
                cause,
            } => {
                write!(
                    f,
                    "assigning '{key}' to '{field_path}': converting '{value}' to type '{type_name}': {cause}"
                )
            }
            EnvErrorKind::Invalid { message } => write!(f, "{message}"),
            EnvErrorKind::Setters { errors } => {
                write!(f, "no setter accepted the value: ")?;
                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{error}")?;
                }
                Ok(())
            }
            EnvErrorKind::Source { key, cause } => {
                write!(f, "lookup for '{key}' failed: {cause}")
            }
            EnvErrorKind::Reflect(reflect_error) => write!(f, "{reflect_error}"),
        }
    }
}

impl From<ReflectError> for EnvErrorKind {
    fn from(value: ReflectError) -> Self {
        Self::Reflect(value)
    }
}

type Result<T> = std::result::Result<T, EnvError>;

/// When the declared `default=` literal substitutes for an absent key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultFallback {
    /// Substitute only when the key is absent *and* the field still holds
    /// its default ("zero") value.
    #[default]
    OnlyIfUnset,
    /// Substitute whenever the key is absent, regardless of the field's
    /// current value.
    AlwaysOnAbsent,
}

const DEFAULT_KEYWORD: &str = "env";

/// A field's parsed tag: the lookup key and an optional default literal.
#[derive(Debug, Clone, Copy)]
struct FieldTag {
    key: &'static str,
    default: Option<&'static str>,
}

/// Populates `Facet` structs from a key/value source.
///
/// A loader is fully assembled by its builder-style methods and immutable
/// afterwards. One loader may serve any number of [`load`](Loader::load) and
/// [`populate`](Loader::populate) calls, including concurrently against
/// distinct targets.
pub struct Loader {
    prefix: String,
    keyword: String,
    override_existing: bool,
    default_fallback: DefaultFallback,
    source: Box<dyn Source>,
}

impl Default for Loader {
    fn default() -> Self {
        Loader {
            prefix: String::new(),
            keyword: DEFAULT_KEYWORD.to_string(),
            override_existing: false,
            default_fallback: DefaultFallback::default(),
            source: Box::new(EnvSource),
        }
    }
}

impl Loader {
    /// Create a loader with the default options: no prefix, the `env`
    /// attribute keyword, no overriding, [`DefaultFallback::OnlyIfUnset`],
    /// and the process environment as the source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key prefix prepended (through the source's compose rule) to
    /// every top-level tag key.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the attribute keyword that introduces field tags.
    ///
    /// With the keyword `cfg`, fields are tagged `#[facet(cfg = "KEY")]` and
    /// the secondary default annotation reads `#[facet(cfg_default = "...")]`.
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }

    /// Allow freshly looked-up values to replace fields that already hold a
    /// non-default value. Only observable through [`populate`](Loader::populate).
    pub fn override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    /// Choose when the declared `default=` literal substitutes for an absent
    /// key.
    pub fn default_fallback(mut self, policy: DefaultFallback) -> Self {
        self.default_fallback = policy;
        self
    }

    /// Replace the key/value source (the process environment by default).
    pub fn source(mut self, source: impl Source + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Build a fresh, fully-populated value.
    ///
    /// Every tagged field is resolved against the source; untagged fields and
    /// fields whose key yields nothing take their type's default value.
    pub fn load<'facet, T: Facet<'facet>>(&self) -> Result<T> {
        let mut typed_partial = Partial::alloc::<T>()?;
        self.walk_struct(typed_partial.inner_mut(), None, &self.prefix)?;
        let boxed_value = typed_partial.build()?;
        Ok(*boxed_value)
    }

    /// Populate an existing value in place.
    ///
    /// Fields that already hold a non-default value are preserved unless
    /// [`override_existing`](Loader::override_existing) is enabled. On error
    /// the target is left untouched.
    pub fn populate<'facet, T: Facet<'facet>>(&self, target: &mut T) -> Result<()> {
        let boxed_value = {
            let peek = Peek::new(&*target);
            let mut typed_partial = Partial::alloc::<T>()?;
            self.walk_struct(typed_partial.inner_mut(), Some(peek), &self.prefix)?;
            typed_partial.build()?
        };
        *target = *boxed_value;
        Ok(())
    }

    fn walk_struct<'mem, 'facet>(
        &self,
        partial: &mut Partial<'facet>,
        existing: Option<Peek<'mem, 'facet>>,
        prefix: &str,
    ) -> Result<()> {
        let shape = partial.shape();
        let Type::User(UserType::Struct(struct_type)) = shape.ty else {
            return Err(EnvErrorKind::NotAStruct(shape).into());
        };
        let record_name = shape.type_identifier;
        log::trace!("Populating {record_name} under prefix '{prefix}'");

        let existing_struct = existing.and_then(|peek| peek.into_struct().ok());

        for (index, field) in struct_type.fields.iter().enumerate() {
            let field_peek = existing_struct
                .as_ref()
                .and_then(|peek| peek.field(index).ok());

            let tag = match parse_field_tag(field, &self.keyword)? {
                Some(tag) => tag,
                None => {
                    self.finish_untouched(partial, index, field_peek)?;
                    continue;
                }
            };

            let key = self.source.compose(prefix, tag.key);
            let field_shape = (field.shape)();

            // A nested record that has no way of setting itself from a single
            // string is a namespace: recurse with an extended prefix instead
            // of looking the field itself up.
            if nested_record_shape(field_shape).is_some() && !coerce::has_setter(field, field_shape)
            {
                log::trace!("Descending into {record_name}.{} under '{key}'", field.name);
                self.descend(partial, index, field_peek, &key)?;
                continue;
            }

            // Leaf field: override policy first.
            if let Some(peek) = field_peek {
                if !self.override_existing && !is_unset(peek) {
                    log::debug!(
                        "'{key}': {record_name}.{} already holds a value, preserving it",
                        field.name
                    );
                    self.finish_untouched(partial, index, field_peek)?;
                    continue;
                }
            }

            let looked_up = self
                .source
                .lookup(&key)
                .map_err(|cause| EnvErrorKind::Source {
                    key: key.clone(),
                    cause,
                })?;

            let value = match looked_up {
                Some(value) => Some(value),
                None => {
                    let field_is_unset = field_peek.map(is_unset).unwrap_or(true);
                    let substitute = match self.default_fallback {
                        DefaultFallback::AlwaysOnAbsent => true,
                        DefaultFallback::OnlyIfUnset => field_is_unset,
                    };
                    if substitute {
                        if tag.default.is_some() {
                            log::debug!("'{key}' not found, falling back to declared default");
                        }
                        tag.default.map(str::to_string)
                    } else {
                        None
                    }
                }
            };

            let value = match value {
                // Empty means "nothing to assign", not an error.
                Some(value) if !value.is_empty() => value,
                _ => {
                    self.finish_untouched(partial, index, field_peek)?;
                    continue;
                }
            };

            log::trace!(
                "Assigning '{value}' from '{key}' to {record_name}.{}",
                field.name
            );
            partial.begin_nth_field(index)?;
            if let Err(cause) = coerce::assign(partial, field, &value) {
                return Err(EnvErrorKind::Assign {
                    key,
                    field_path: format!("{record_name}.{}", field.name),
                    type_name: field_shape.type_identifier,
                    value,
                    cause: Box::new(cause),
                }
                .into());
            }
            partial.end()?;
        }

        Ok(())
    }

    /// Recurse into a nested record field, allocating through an absent
    /// `Option` or through a smart pointer so the walk always sees a concrete
    /// record.
    fn descend<'mem, 'facet>(
        &self,
        partial: &mut Partial<'facet>,
        index: usize,
        field_peek: Option<Peek<'mem, 'facet>>,
        prefix: &str,
    ) -> Result<()> {
        partial.begin_nth_field(index)?;
        if matches!(partial.shape().def, Def::Option(_)) {
            partial.begin_some()?;
            let inner_peek = field_peek
                .and_then(|peek| peek.into_option().ok())
                .and_then(|option_peek| option_peek.value());
            self.walk_struct(partial, inner_peek, prefix)?;
            partial.end()?;
        } else if matches!(partial.shape().def, Def::Pointer(_)) {
            partial.begin_smart_ptr()?;
            let inner_peek = field_peek.map(|peek| peek.innermost_peek());
            self.walk_struct(partial, inner_peek, prefix)?;
            partial.end()?;
        } else {
            self.walk_struct(partial, field_peek, prefix)?;
        }
        partial.end()?;
        Ok(())
    }

    /// Leave a field at its caller-supplied value (copied from the existing
    /// record) or, on a fresh load, at its type default.
    fn finish_untouched<'mem, 'facet>(
        &self,
        partial: &mut Partial<'facet>,
        index: usize,
        field_peek: Option<Peek<'mem, 'facet>>,
    ) -> Result<()> {
        match field_peek {
            Some(peek) => {
                partial.begin_nth_field(index)?;
                unsafe { partial.set_from_peek(&peek) }?;
                partial.end()?;
            }
            None => {
                partial.set_nth_field_to_default(index)?;
            }
        }
        Ok(())
    }
}

/// Populate a fresh value from the process environment with the default
/// loader options.
pub fn from_env<'facet, T: Facet<'facet>>() -> Result<T> {
    Loader::new().load()
}

/// The record shape a field resolves to, looking through one level of
/// `Option` or smart pointer.
fn nested_record_shape(shape: &'static Shape) -> Option<&'static Shape> {
    let inner = match shape.def {
        Def::Option(option_def) => option_def.t,
        Def::Pointer(pointer_def) => pointer_def.pointee()?,
        _ => shape,
    };
    matches!(inner.ty, Type::User(UserType::Struct(_))).then_some(inner)
}

/// Whether a value is still in its default ("zero") state: `None` options,
/// empty strings, zero numbers, `false`, empty collections, records whose
/// fields are all unset. Shapes we cannot judge count as set, so they get
/// preserved rather than overwritten.
fn is_unset(peek: Peek<'_, '_>) -> bool {
    if let Ok(option_peek) = peek.into_option() {
        return option_peek.is_none();
    }
    if matches!(peek.shape().def, Def::Pointer(_)) {
        return is_unset(peek.innermost_peek());
    }
    if peek.shape().type_identifier == "Duration" {
        if let Ok(duration) = peek.get::<std::time::Duration>() {
            return duration.is_zero();
        }
    }
    // Strings aren't primitive but are treated as such
    if let Ok(s) = peek.get::<String>() {
        return s.is_empty();
    }
    if let Ok(s) = peek.get::<std::borrow::Cow<str>>() {
        return s.is_empty();
    }
    if let Some(scalar) = peek.scalar_type() {
        return scalar_is_zero(peek, scalar);
    }
    if let Ok(list_peek) = peek.into_list_like() {
        return list_peek.iter().next().is_none();
    }
    if let Ok(map_peek) = peek.into_map() {
        return map_peek.iter().next().is_none();
    }
    if let Ok(struct_peek) = peek.into_struct() {
        return struct_peek
            .fields()
            .all(|(_, field_peek)| is_unset(field_peek));
    }
    false
}

fn scalar_is_zero(peek: Peek<'_, '_>, scalar: ScalarType) -> bool {
    match scalar {
        ScalarType::Bool => peek.get::<bool>().map(|v| !*v).unwrap_or(false),
        ScalarType::Char => peek.get::<char>().map(|v| *v == '\0').unwrap_or(false),
        ScalarType::F32 => peek.get::<f32>().map(|v| *v == 0.0).unwrap_or(false),
        ScalarType::F64 => peek.get::<f64>().map(|v| *v == 0.0).unwrap_or(false),
        ScalarType::I8 => peek.get::<i8>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::I16 => peek.get::<i16>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::I32 => peek.get::<i32>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::I64 => peek.get::<i64>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::I128 => peek.get::<i128>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::ISize => peek.get::<isize>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::U8 => peek.get::<u8>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::U16 => peek.get::<u16>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::U32 => peek.get::<u32>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::U64 => peek.get::<u64>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::U128 => peek.get::<u128>().map(|v| *v == 0).unwrap_or(false),
        ScalarType::USize => peek.get::<usize>().map(|v| *v == 0).unwrap_or(false),
        _ => false,
    }
}

/// Parse a field's tag into its key and default, if the field carries one.
///
/// Returns `Ok(None)` for untagged fields and for the exclusion sentinels
/// (empty key or `-`).
fn parse_field_tag(field: &'static Field, keyword: &str) -> Result<Option<FieldTag>> {
    let Some(raw) = tag_text(field, keyword) else {
        return Ok(None);
    };

    let mut segments = raw.split(',');
    let key = segments.next().unwrap_or("");
    if key.is_empty() || key == "-" {
        return Ok(None);
    }
    if key.contains(char::is_whitespace) {
        return Err(EnvErrorKind::InvalidTag {
            field: field.name,
            tag: raw,
            reason: "key cannot contain whitespace characters".to_string(),
        }
        .into());
    }

    let mut default = None;
    for segment in segments {
        match segment.split_once('=') {
            Some(("default", value)) => default = Some(value),
            Some(_) => {
                // Unrecognized modifiers are ignored for forward compatibility.
            }
            None => {
                if segment == "default" {
                    return Err(EnvErrorKind::InvalidTag {
                        field: field.name,
                        tag: raw,
                        reason: "modifier 'default' requires a value, as in 'default=xxx'"
                            .to_string(),
                    }
                    .into());
                }
            }
        }
    }

    if default.is_none() {
        default = fallback_default(field, keyword);
    }

    Ok(Some(FieldTag { key, default }))
}

/// Extract the raw tag text from the field's `#[facet(<keyword> = "...")]`
/// attribute. The derive records arbitrary attributes verbatim, so both the
/// `keyword = "text"` and `keyword("text")` spellings are accepted.
fn tag_text(field: &'static Field, keyword: &str) -> Option<&'static str> {
    for attribute in field.attributes {
        if let FieldAttribute::Arbitrary(text) = attribute {
            if let Some(tag) = strip_keyword(text, keyword) {
                return Some(tag);
            }
        }
    }
    None
}

fn strip_keyword(text: &'static str, keyword: &str) -> Option<&'static str> {
    let rest = text.strip_prefix(keyword)?;
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        // Bare marker with no key: the field is not externally configurable.
        return Some("");
    }
    if let Some(after) = trimmed.strip_prefix('=') {
        return Some(unquote(after.trim()));
    }
    if let Some(after) = trimmed.strip_prefix('(') {
        let inner = after.trim_end().strip_suffix(')')?;
        return Some(unquote(inner.trim()));
    }
    // Some other attribute that merely shares the keyword as a prefix.
    None
}

/// The secondary default annotation, `#[facet(<keyword>_default = "...")]`,
/// consulted when the primary tag carries no `default=` modifier.
fn fallback_default(field: &'static Field, keyword: &str) -> Option<&'static str> {
    let marker = format!("{keyword}_default");
    for attribute in field.attributes {
        if let FieldAttribute::Arbitrary(text) = attribute {
            if let Some(rest) = text.strip_prefix(marker.as_str()) {
                let trimmed = rest.trim_start();
                if let Some(after) = trimmed.strip_prefix('=') {
                    return Some(unquote(after.trim()));
                }
                if let Some(after) = trimmed.strip_prefix('(') {
                    if let Some(inner) = after.trim_end().strip_suffix(')') {
                        return Some(unquote(inner.trim()));
                    }
                }
            }
        }
    }
    None
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|text| text.strip_suffix('"'))
        .unwrap_or(text)
}
