//! Per-conversion diagnostics carrier.

use crate::config::Configuration;
use crate::conversion::TypeKey;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

/// Where a converted value is going to be bound, for converters that adapt
/// their behavior to the consuming member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InjectionSite {
    owner: String,
    member: String,
}

impl InjectionSite {
    pub fn new(owner: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            member: member.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn member(&self) -> &str {
        &self.member
    }
}

impl fmt::Display for InjectionSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.member)
    }
}

struct Inner {
    key: Option<String>,
    target: TypeKey,
    site: Option<InjectionSite>,
    configuration: Option<Configuration>,
    formats: Arc<Mutex<Vec<String>>>,
}

/// State of one `get_as` call, shared by every converter it tries.
///
/// Converters declare the formats they understand through
/// [`add_supported_formats`](ConversionContext::add_supported_formats); the
/// accumulated list ends up in the error when no converter accepts the
/// value. Cloning is cheap and clones share the format list.
#[derive(Clone)]
pub struct ConversionContext {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConversionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionContext")
            .field("key", &self.inner.key)
            .field("target", &self.inner.target)
            .field("site", &self.inner.site)
            .field("formats", &self.supported_formats())
            .finish()
    }
}

thread_local! {
    static ACTIVE: RefCell<Vec<ConversionContext>> = const { RefCell::new(Vec::new()) };
}

impl ConversionContext {
    pub fn builder(target: TypeKey) -> ConversionContextBuilder {
        ConversionContextBuilder {
            key: None,
            target,
            site: None,
            configuration: None,
        }
    }

    /// Context without key or configuration, for converting free-standing
    /// text.
    pub fn of_type<T: 'static>() -> Self {
        Self::builder(TypeKey::of::<T>()).build()
    }

    pub fn key(&self) -> Option<&str> {
        self.inner.key.as_deref()
    }

    pub fn target(&self) -> TypeKey {
        self.inner.target
    }

    pub fn injection_site(&self) -> Option<&InjectionSite> {
        self.inner.site.as_ref()
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.inner.configuration.as_ref()
    }

    /// Records the formats a converter understands, each rendered as
    /// `"<format> (<converter>)"`. Duplicates are skipped.
    pub fn add_supported_formats(&self, converter: &str, formats: &[&str]) {
        let mut list = self.inner.formats.lock().unwrap_or_else(|e| e.into_inner());
        for format in formats {
            let entry = format!("{format} ({converter})");
            if !list.contains(&entry) {
                list.push(entry);
            }
        }
    }

    pub fn supported_formats(&self) -> Vec<String> {
        self.inner
            .formats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Context for converting a component of the current value (list
    /// elements, wrapped values). Shares key, site, configuration and the
    /// format list with `self`.
    pub fn nested(&self, target: TypeKey) -> Self {
        Self {
            inner: Arc::new(Inner {
                key: self.inner.key.clone(),
                target,
                site: self.inner.site.clone(),
                configuration: self.inner.configuration.clone(),
                formats: Arc::clone(&self.inner.formats),
            }),
        }
    }

    /// Makes this context the thread's current one until the guard drops.
    ///
    /// Contexts stack: entering a nested context keeps the outer one
    /// underneath, and dropping the guard restores it.
    pub fn enter(&self) -> ContextGuard {
        ACTIVE.with(|stack| stack.borrow_mut().push(self.clone()));
        ContextGuard {
            _not_send: PhantomData,
        }
    }

    /// The innermost context entered on this thread.
    pub fn current() -> Option<ConversionContext> {
        ACTIVE.with(|stack| stack.borrow().last().cloned())
    }
}

/// Pops the context pushed by [`ConversionContext::enter`].
#[must_use = "the context is only current while the guard is alive"]
pub struct ContextGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        ACTIVE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

pub struct ConversionContextBuilder {
    key: Option<String>,
    target: TypeKey,
    site: Option<InjectionSite>,
    configuration: Option<Configuration>,
}

impl ConversionContextBuilder {
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn injection_site(mut self, site: InjectionSite) -> Self {
        self.site = Some(site);
        self
    }

    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn build(self) -> ConversionContext {
        ConversionContext {
            inner: Arc::new(Inner {
                key: self.key,
                target: self.target,
                site: self.site,
                configuration: self.configuration,
                formats: Arc::new(Mutex::new(Vec::new())),
            }),
        }
    }
}
