//! Layered handler registry.
//!
//! # Responsibilities
//! - Hold registered handler layers, newest on top
//! - Resolve an event name to the nearest layer defining it
//!
//! # Design Decisions
//! - A later layer shadows individual names and inherits everything else
//! - Immutable after construction (lock-free concurrent lookup)
//! - Explicit UnknownEvent rather than a silent default

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::dispatch::error::DispatchError;
use crate::dispatch::handler::Handler;

/// One registered batch of event → handler bindings.
#[derive(Clone, Default)]
pub struct Layer {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handler`, replacing any earlier binding in this layer.
    pub fn on(mut self, name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(name)
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Layer").field("events", &names).finish()
    }
}

/// A layer or an arbitrarily nested list of them.
#[derive(Debug, Clone)]
pub enum Descriptor {
    Layer(Layer),
    List(Vec<Descriptor>),
}

impl From<Layer> for Descriptor {
    fn from(layer: Layer) -> Self {
        Descriptor::Layer(layer)
    }
}

impl<T: Into<Descriptor>> From<Vec<T>> for Descriptor {
    fn from(items: Vec<T>) -> Self {
        Descriptor::List(items.into_iter().map(Into::into).collect())
    }
}

/// Collects layers before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    layers: Vec<Arc<Layer>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a descriptor. Lists are flattened left to right, recursively;
    /// every layer lands on top of the ones added before it.
    pub fn add(&mut self, descriptor: impl Into<Descriptor>) -> &mut Self {
        match descriptor.into() {
            Descriptor::Layer(layer) => self.layers.push(Arc::new(layer)),
            Descriptor::List(items) => {
                for item in items {
                    self.add(item);
                }
            }
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            layers: self.layers,
        }
    }
}

impl<D: Into<Descriptor>> Extend<D> for RegistryBuilder {
    fn extend<I: IntoIterator<Item = D>>(&mut self, descriptors: I) {
        for descriptor in descriptors {
            self.add(descriptor);
        }
    }
}

/// Immutable layer stack, searched newest to oldest.
#[derive(Debug, Default, Clone)]
pub struct HandlerRegistry {
    /// Oldest first.
    layers: Vec<Arc<Layer>>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Find the handler for `name` in the nearest layer that defines it.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Handler>, DispatchError> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(name))
            .cloned()
            .ok_or_else(|| DispatchError::UnknownEvent(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.iter().any(|layer| layer.get(name).is_some())
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Every resolvable event name, sorted.
    pub fn event_names(&self) -> Vec<String> {
        self.layers
            .iter()
            .flat_map(|layer| layer.handlers.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
