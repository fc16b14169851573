//! Converter registry: prioritized, transitively indexed, self-extending.

use super::{builtin, simple_type_name, ConversionContext, TypeKey};
use crate::error::{ConfigError, ConfigResult};
use arc_swap::ArcSwap;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, trace};

/// Converts raw text to a `T`.
///
/// * `Ok(Some(v))` accepts the value.
/// * `Ok(None)` declines: the format is not recognised, the next converter
///   is tried.
/// * `Err(e)` also declines, after logging `e`.
///
/// Implementations should declare the formats they understand through
/// [`ConversionContext::add_supported_formats`] before parsing.
pub trait PropertyConverter<T>: Send + Sync {
    fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<T>>;

    /// Name used for ordering ties and in diagnostics.
    fn name(&self) -> &str {
        simple_type_name(std::any::type_name::<Self>())
    }
}

/// Converter built from a closure.
pub struct FnConverter<F> {
    name: String,
    f: F,
}

impl<F> FnConverter<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<T, F> PropertyConverter<T> for FnConverter<F>
where
    F: Fn(&str, &ConversionContext) -> ConfigResult<Option<T>> + Send + Sync,
{
    fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<T>> {
        (self.f)(value, ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Enumerations convertible from their constant names.
///
/// # Example
/// ```
/// use tamaya::conversion::{ConfigEnum, ConversionContext, ConverterRegistry};
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum Level { Low, High }
///
/// impl ConfigEnum for Level {
///     const VARIANTS: &'static [(&'static str, Self)] = &[("Low", Level::Low), ("High", Level::High)];
/// }
///
/// let registry = ConverterRegistry::new();
/// registry.register_enum::<Level>();
/// let ctx = ConversionContext::of_type::<Level>();
/// assert_eq!(registry.convert_value::<Level>("High", &ctx).unwrap(), Level::High);
/// assert!(registry.convert_value::<Level>("high", &ctx).is_err());
/// ```
pub trait ConfigEnum: Sized + Clone + Send + Sync + 'static {
    /// Constant names and values. Names match case-sensitively.
    const VARIANTS: &'static [(&'static str, Self)];
}

struct EnumConverter<E>(PhantomData<fn() -> E>);

impl<E: ConfigEnum> PropertyConverter<E> for EnumConverter<E> {
    fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<E>> {
        let names: Vec<&str> = E::VARIANTS.iter().map(|(name, _)| *name).collect();
        ctx.add_supported_formats(self.name(), &[names.join("|").as_str()]);
        let value = value.trim();
        Ok(E::VARIANTS
            .iter()
            .find(|(name, _)| *name == value)
            .map(|(_, variant)| variant.clone()))
    }

    fn name(&self) -> &str {
        "EnumConverter"
    }
}

struct FromStrConverter<T>(PhantomData<fn() -> T>);

impl<T> PropertyConverter<T> for FromStrConverter<T>
where
    T: FromStr + 'static,
    T::Err: Display,
{
    fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<T>> {
        let format = format!("<{}>", simple_type_name(std::any::type_name::<T>()));
        ctx.add_supported_formats(self.name(), &[format.as_str()]);
        value.trim().parse::<T>().map(Some).map_err(|e| {
            ConfigError::invalid_value(format!(
                "cannot parse '{value}' as {}: {e}",
                std::any::type_name::<T>()
            ))
        })
    }

    fn name(&self) -> &str {
        "FromStrConverter"
    }
}

type AnyValue = Box<dyn Any>;
type Cast = Arc<dyn Fn(AnyValue) -> Option<AnyValue> + Send + Sync>;

trait ErasedConverter: Send + Sync {
    fn convert_any(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<AnyValue>>;
}

struct Typed<T> {
    inner: Arc<dyn PropertyConverter<T>>,
}

impl<T: 'static> ErasedConverter for Typed<T> {
    fn convert_any(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<AnyValue>> {
        Ok(self
            .inner
            .convert(value, ctx)?
            .map(|v| Box::new(v) as AnyValue))
    }
}

/// A converter reached through declared supertypes: its output is cast up
/// the chain before being handed out.
struct Upcast {
    inner: Arc<dyn ErasedConverter>,
    casts: Vec<Cast>,
}

impl ErasedConverter for Upcast {
    fn convert_any(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<AnyValue>> {
        let Some(mut current) = self.inner.convert_any(value, ctx)? else {
            return Ok(None);
        };
        for cast in &self.casts {
            current = match cast(current) {
                Some(next) => next,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }
}

#[derive(Clone)]
struct Entry {
    name: Arc<str>,
    priority: i32,
    identity: usize,
    converter: Arc<dyn ErasedConverter>,
}

impl Entry {
    fn typed<T: 'static>(converter: Arc<dyn PropertyConverter<T>>, priority: i32) -> Self {
        Self {
            name: Arc::from(converter.name()),
            priority,
            identity: Arc::as_ptr(&converter) as *const () as usize,
            converter: Arc::new(Typed { inner: converter }),
        }
    }

    fn upcast(&self, casts: Vec<Cast>) -> Self {
        Self {
            converter: Arc::new(Upcast {
                inner: Arc::clone(&self.converter),
                casts,
            }),
            ..self.clone()
        }
    }
}

fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
}

#[derive(Clone)]
struct Relation {
    target: TypeKey,
    cast: Cast,
}

#[derive(Clone, Default)]
struct Relations {
    superclass: Option<Relation>,
    interfaces: Vec<Relation>,
}

#[derive(Clone, Default)]
struct State {
    direct: HashMap<TypeKey, Vec<Entry>>,
    transitive: HashMap<TypeKey, Vec<Entry>>,
    relations: HashMap<TypeKey, Relations>,
    defaults: HashMap<TypeKey, Entry>,
}

impl State {
    fn insert_direct(&mut self, target: TypeKey, entry: Entry) -> bool {
        let entries = self.direct.entry(target).or_default();
        if entries.iter().any(|e| e.identity == entry.identity) {
            return false;
        }
        entries.push(entry);
        sort_entries(entries);
        true
    }

    /// Supertypes of `ty` with the casts leading there: the interfaces
    /// declared by `ty`, its superclass chain, and the interfaces declared
    /// by each superclass. Interfaces of interfaces are not followed.
    fn ancestors(&self, ty: TypeKey) -> Vec<(TypeKey, Vec<Cast>)> {
        let mut out = Vec::new();
        let mut visited = HashSet::from([ty]);
        let mut chain: Vec<Cast> = Vec::new();
        let mut current = ty;
        while let Some(relations) = self.relations.get(&current) {
            for interface in &relations.interfaces {
                if visited.insert(interface.target) {
                    let mut casts = chain.clone();
                    casts.push(Arc::clone(&interface.cast));
                    out.push((interface.target, casts));
                }
            }
            match &relations.superclass {
                Some(superclass) if visited.insert(superclass.target) => {
                    chain.push(Arc::clone(&superclass.cast));
                    out.push((superclass.target, chain.clone()));
                    current = superclass.target;
                }
                _ => break,
            }
        }
        out
    }

    fn reindex(&mut self) {
        let mut transitive: HashMap<TypeKey, Vec<Entry>> = HashMap::new();
        for (ty, entries) in &self.direct {
            for (ancestor, casts) in self.ancestors(*ty) {
                let indexed = transitive.entry(ancestor).or_default();
                for entry in entries {
                    if !indexed.iter().any(|e| e.identity == entry.identity) {
                        indexed.push(entry.upcast(casts.clone()));
                    }
                }
            }
        }
        for entries in transitive.values_mut() {
            sort_entries(entries);
        }
        self.transitive = transitive;
    }
}

/// Handle on one registered converter for `T`.
pub struct Converter<T> {
    entry: Entry,
    _target: PhantomData<fn() -> T>,
}

impl<T> Clone for Converter<T> {
    fn clone(&self) -> Self {
        Self {
            entry: self.entry.clone(),
            _target: PhantomData,
        }
    }
}

impl<T> PartialEq for Converter<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entry.identity == other.entry.identity
            && self.entry.priority == other.entry.priority
            && self.entry.name == other.entry.name
    }
}

impl<T> fmt::Debug for Converter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("name", &self.entry.name)
            .field("priority", &self.entry.priority)
            .finish()
    }
}

impl<T: 'static> Converter<T> {
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn priority(&self) -> i32 {
        self.entry.priority
    }

    pub fn convert(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<Option<T>> {
        match self.entry.converter.convert_any(value, ctx)? {
            Some(boxed) => boxed.downcast::<T>().map(|v| Some(*v)).map_err(|_| {
                ConfigError::invalid_value(format!(
                    "converter {} produced a value that is not {}",
                    self.entry.name,
                    std::any::type_name::<T>()
                ))
            }),
            None => Ok(None),
        }
    }
}

/// Registry mapping target types to ordered converter lists.
///
/// Lookups read an immutable snapshot; registrations copy the snapshot,
/// modify it and publish it atomically, so readers never block.
///
/// [`get_converters`](ConverterRegistry::get_converters) returns, in order:
/// 1. converters registered for the type itself, highest priority first,
///    ties by converter name;
/// 2. converters registered for subtypes declared with
///    [`declare_superclass`](ConverterRegistry::declare_superclass) or
///    [`declare_interface`](ConverterRegistry::declare_interface);
/// 3. when both are empty, a default converter installed by
///    [`register_enum`](ConverterRegistry::register_enum) or
///    [`register_from_str`](ConverterRegistry::register_from_str), which is
///    then moved into the direct registrations.
pub struct ConverterRegistry {
    state: ArcSwap<State>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load();
        f.debug_struct("ConverterRegistry")
            .field("types", &state.direct.len())
            .field("transitive", &state.transitive.len())
            .field("defaults", &state.defaults.len())
            .finish()
    }
}

impl ConverterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(State::default()),
        }
    }

    /// Creates a registry holding the built-in converters.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        builtin::register_defaults(&registry);
        registry
    }

    /// Registers a converter for `T`. Returns `false` if this exact
    /// converter instance is already registered for `T`.
    pub fn register<T, C>(&self, priority: i32, converter: C) -> bool
    where
        T: 'static,
        C: PropertyConverter<T> + 'static,
    {
        self.register_arc::<T>(priority, Arc::new(converter))
    }

    /// Registers a shared converter instance. Registering the same `Arc`
    /// twice for a type has no effect.
    pub fn register_arc<T: 'static>(&self, priority: i32, converter: Arc<dyn PropertyConverter<T>>) -> bool {
        let target = TypeKey::of::<T>();
        let entry = Entry::typed(converter, priority);
        let mut inserted = false;
        self.state.rcu(|state| {
            let mut next = State::clone(state);
            inserted = next.insert_direct(target, entry.clone());
            if inserted {
                next.reindex();
            }
            next
        });
        if inserted {
            trace!(target = %target, converter = %entry.name, priority, "registered converter");
        }
        inserted
    }

    /// Registers a closure as a named converter.
    pub fn register_fn<T, F>(&self, name: impl Into<String>, priority: i32, f: F) -> bool
    where
        T: 'static,
        F: Fn(&str, &ConversionContext) -> ConfigResult<Option<T>> + Send + Sync + 'static,
    {
        self.register::<T, _>(priority, FnConverter::new(name, f))
    }

    /// Declares `Super` as the superclass of `Sub`. Converters for `Sub`
    /// become reachable for `Super` (and for `Super`'s own supertypes),
    /// their output passed through `cast`.
    pub fn declare_superclass<Sub, Super, F>(&self, cast: F)
    where
        Sub: 'static,
        Super: 'static,
        F: Fn(Sub) -> Super + Send + Sync + 'static,
    {
        let relation = Relation {
            target: TypeKey::of::<Super>(),
            cast: erase_cast(cast),
        };
        self.update_relations(TypeKey::of::<Sub>(), move |relations| {
            relations.superclass = Some(relation.clone());
        });
    }

    /// Declares `Sub` as implementing the interface type `Iface` (typically
    /// a boxed trait object).
    pub fn declare_interface<Sub, Iface, F>(&self, cast: F)
    where
        Sub: 'static,
        Iface: 'static,
        F: Fn(Sub) -> Iface + Send + Sync + 'static,
    {
        let relation = Relation {
            target: TypeKey::of::<Iface>(),
            cast: erase_cast(cast),
        };
        self.update_relations(TypeKey::of::<Sub>(), move |relations| {
            relations.interfaces.retain(|r| r.target != relation.target);
            relations.interfaces.push(relation.clone());
        });
    }

    fn update_relations(&self, ty: TypeKey, update: impl Fn(&mut Relations)) {
        self.state.rcu(|state| {
            let mut next = State::clone(state);
            update(next.relations.entry(ty).or_default());
            next.reindex();
            next
        });
    }

    /// Installs a default converter for an enumeration, matching constant
    /// names case-sensitively.
    pub fn register_enum<E: ConfigEnum>(&self) {
        self.register_default::<E>(Arc::new(EnumConverter::<E>(PhantomData)));
    }

    /// Installs a default converter built on `T`'s `FromStr`.
    pub fn register_from_str<T>(&self)
    where
        T: FromStr + 'static,
        T::Err: Display,
    {
        self.register_default::<T>(Arc::new(FromStrConverter::<T>(PhantomData)));
    }

    fn register_default<T: 'static>(&self, converter: Arc<dyn PropertyConverter<T>>) {
        let target = TypeKey::of::<T>();
        let entry = Entry::typed(converter, 0);
        self.state.rcu(|state| {
            let mut next = State::clone(state);
            next.defaults.insert(target, entry.clone());
            next
        });
    }

    /// Ordered converters for `T`, synthesizing a default one if nothing is
    /// registered.
    pub fn get_converters<T: 'static>(&self) -> Vec<Converter<T>> {
        let target = TypeKey::of::<T>();
        let state = self.state.load_full();

        let mut entries = state.direct.get(&target).cloned().unwrap_or_default();
        if let Some(inherited) = state.transitive.get(&target) {
            for entry in inherited {
                if !entries.iter().any(|e| e.identity == entry.identity) {
                    entries.push(entry.clone());
                }
            }
        }

        if entries.is_empty() && target != TypeKey::of::<String>() {
            let default = state.defaults.get(&target).cloned();
            if let Some(entry) = default {
                debug!(target = %target, converter = %entry.name, "synthesized default converter");
                self.state.rcu(|current| {
                    let mut next = State::clone(current);
                    if next.insert_direct(target, entry.clone()) {
                        next.reindex();
                    }
                    next
                });
                entries.push(entry);
            }
        }

        entries
            .into_iter()
            .map(|entry| Converter {
                entry,
                _target: PhantomData,
            })
            .collect()
    }

    /// Whether any converter is registered for `T`, directly or through a
    /// declared subtype. Does not synthesize.
    pub fn has_converters<T: 'static>(&self) -> bool {
        let target = TypeKey::of::<T>();
        let state = self.state.load();
        state.direct.get(&target).is_some_and(|e| !e.is_empty())
            || state.transitive.get(&target).is_some_and(|e| !e.is_empty())
    }

    /// Types with directly registered converters.
    pub fn converted_types(&self) -> Vec<TypeKey> {
        self.state.load().direct.keys().copied().collect()
    }

    /// Converts `value` with the converters for `T`, in order.
    ///
    /// A converter that declines or fails hands over to the next one. When
    /// all decline, a `String` target receives the text unchanged; any other
    /// target yields [`ConfigError::Unconvertible`] listing the formats the
    /// attempted converters declared.
    pub fn convert_value<T: 'static>(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<T> {
        let converters = self.get_converters::<T>();
        let _current = ctx.enter();
        for converter in &converters {
            match converter.convert(value, ctx) {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => {
                    trace!(converter = converter.name(), value, "converter declined value");
                }
                Err(e) => {
                    debug!(
                        converter = converter.name(),
                        key = ctx.key().unwrap_or_default(),
                        error = %e,
                        "converter failed, trying next"
                    );
                }
            }
        }

        let raw: AnyValue = Box::new(value.to_string());
        match raw.downcast::<T>() {
            Ok(text) => Ok(*text),
            Err(_) => Err(ConfigError::unconvertible(
                ctx.key().unwrap_or_default(),
                value,
                TypeKey::of::<T>().name(),
                ctx.supported_formats(),
            )),
        }
    }

    /// Converts a component of a larger value through a nested context that
    /// shares `ctx`'s diagnostics.
    pub fn convert_nested<T: 'static>(&self, value: &str, ctx: &ConversionContext) -> ConfigResult<T> {
        self.convert_value::<T>(value, &ctx.nested(TypeKey::of::<T>()))
    }
}

fn erase_cast<Sub, Super, F>(cast: F) -> Cast
where
    Sub: 'static,
    Super: 'static,
    F: Fn(Sub) -> Super + Send + Sync + 'static,
{
    Arc::new(move |value: AnyValue| {
        value
            .downcast::<Sub>()
            .ok()
            .map(|sub| Box::new(cast(*sub)) as AnyValue)
    })
}
