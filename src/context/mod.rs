//! # Request context
//!
//! One [`RequestContext`] is built per inbound request and threaded by
//! `&mut` through every stage of the chain. It is a typed key/value store:
//! a [`ContextKey<T>`] names a slot and fixes the type stored there, so a
//! read can never silently reinterpret another stage's value.
//!
//! Reading a key nobody wrote is an error ([`BrainError::MissingContextKey`]),
//! never a default. Keys written with [`RequestContext::put_frozen`] reject
//! every later write.
//!
//! ```
//! use brainchain::context::{ContextKey, Phase, RequestContext, RequestInfo};
//!
//! const GREETING: ContextKey<String> = ContextKey::new("greeting");
//!
//! let mut ctx = RequestContext::new(RequestInfo::new("user-1", "conv-1", "hi", "trace-1"));
//! {
//!     let mut phase = Phase::begin(&mut ctx, "greeter", 0);
//!     phase.ctx().put(GREETING, "hello".to_string()).unwrap();
//! }
//! assert_eq!(ctx.get(GREETING).unwrap(), "hello");
//! assert_eq!(ctx.meta("greeting").unwrap().writer.stage, "greeter");
//! ```

pub mod keys;
pub mod phase;
pub mod slot;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::{BrainError, Result};

pub use phase::Phase;
pub use slot::{SlotMeta, TypedSlot, Writer};

/// A typed name for a context slot.
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    /// A key named `name`. Names must be unique per value type.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The key's name, as used in trace entries and errors.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextKey({})", self.name)
    }
}

/// Identifiers of the request being processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    pub user_id: String,
    pub conversation_id: String,
    pub message: String,
    pub trace_id: String,
}

impl RequestInfo {
    /// Request info with the given ids and message.
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        message: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            message: message.into(),
            trace_id: trace_id.into(),
        }
    }
}

/// Request-scoped store shared by the stages of one chain run.
#[derive(Debug)]
pub struct RequestContext {
    request: RequestInfo,
    slots: HashMap<&'static str, TypedSlot>,
    writer: Writer,
    epoch: u64,
    trace: Vec<String>,
}

impl RequestContext {
    /// Empty context for one request.
    pub fn new(request: RequestInfo) -> Self {
        Self {
            request,
            slots: HashMap::new(),
            writer: Writer::host(),
            epoch: 0,
            trace: Vec::new(),
        }
    }

    /// The inbound request this context serves.
    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    /// Trace id of the request.
    pub fn trace_id(&self) -> &str {
        &self.request.trace_id
    }

    /// Write (or overwrite) a slot.
    pub fn put<T: Any + Send + Sync>(&mut self, key: ContextKey<T>, value: T) -> Result<()> {
        self.write(key, value, false)
    }

    /// Write a slot that no later write may change.
    pub fn put_frozen<T: Any + Send + Sync>(&mut self, key: ContextKey<T>, value: T) -> Result<()> {
        self.write(key, value, true)
    }

    fn write<T: Any + Send + Sync>(
        &mut self,
        key: ContextKey<T>,
        value: T,
        freeze: bool,
    ) -> Result<()> {
        self.epoch += 1;
        let name = key.name();
        match self.slots.get_mut(name) {
            Some(slot) if slot.meta.frozen => {
                return Err(BrainError::FrozenContextKey {
                    key: name,
                    writer: slot.meta.writer.stage.clone(),
                });
            }
            Some(slot) => {
                slot.replace(value, self.writer.clone(), self.epoch);
                slot.meta.frozen = freeze;
            }
            None => {
                let mut slot = TypedSlot::new(value, self.writer.clone(), self.epoch);
                slot.meta.frozen = freeze;
                self.slots.insert(name, slot);
            }
        }
        self.trace.push(name.to_string());
        Ok(())
    }

    /// Typed read. Missing keys are an error, never a default.
    pub fn get<T: Any>(&self, key: ContextKey<T>) -> Result<&T> {
        let name = key.name();
        let slot = self
            .slots
            .get(name)
            .ok_or(BrainError::MissingContextKey { key: name })?;
        slot.downcast_ref::<T>()
            .ok_or(BrainError::ContextTypeMismatch { key: name })
    }

    /// Mutable access to an existing, unfrozen slot. Counts as a write.
    pub fn get_mut<T: Any>(&mut self, key: ContextKey<T>) -> Result<&mut T> {
        let name = key.name();
        let slot = self
            .slots
            .get_mut(name)
            .ok_or(BrainError::MissingContextKey { key: name })?;
        if slot.meta.frozen {
            return Err(BrainError::FrozenContextKey {
                key: name,
                writer: slot.meta.writer.stage.clone(),
            });
        }
        if !slot.is::<T>() {
            return Err(BrainError::ContextTypeMismatch { key: name });
        }
        self.epoch += 1;
        slot.meta.writer = self.writer.clone();
        slot.meta.epoch = self.epoch;
        slot.downcast_mut::<T>()
            .ok_or(BrainError::ContextTypeMismatch { key: name })
    }

    /// For data that is legitimately optional (e.g. an optional stage's output).
    pub fn try_get<T: Any>(&self, key: ContextKey<T>) -> Option<&T> {
        self.slots.get(key.name())?.downcast_ref::<T>()
    }

    /// Whether `key` has been written.
    pub fn contains<T>(&self, key: ContextKey<T>) -> bool {
        self.slots.contains_key(key.name())
    }

    /// Writer and epoch metadata for a slot.
    pub fn meta(&self, name: &str) -> Option<&SlotMeta> {
        self.slots.get(name).map(|s| &s.meta)
    }

    /// Names of all written keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Written keys and phase markers, in order.
    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// The stage currently allowed to write.
    pub fn current_writer(&self) -> &Writer {
        &self.writer
    }

    pub(crate) fn set_writer(&mut self, writer: Writer) -> Writer {
        std::mem::replace(&mut self.writer, writer)
    }

    pub(crate) fn record_phase_start(&mut self, phase: &str) {
        self.trace.push(format!(">>phase:{}", phase));
    }

    pub(crate) fn record_phase_end(&mut self, phase: &str, elapsed_ms: u64) {
        self.trace.push(format!("<<phase:{}:{}ms", phase, elapsed_ms));
    }
}
