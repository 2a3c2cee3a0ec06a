//! Typed context slot: a type-erased value plus who wrote it and when.

use std::any::{Any, TypeId};

use serde::Serialize;

/// Identity of the stage (or host) currently allowed to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Writer {
    pub stage: String,
    pub order: i32,
}

impl Writer {
    /// The request host, writing before any stage runs.
    pub fn host() -> Self {
        Self {
            stage: "request".to_string(),
            order: i32::MIN,
        }
    }
}

/// Metadata attached to a context slot.
#[derive(Debug, Clone, Serialize)]
pub struct SlotMeta {
    /// Stage that first created this key. Survives later overwrites.
    pub first_writer: Writer,
    /// Stage that wrote the current value.
    pub writer: Writer,
    /// Monotonic per-request write counter at the time of the last write.
    pub epoch: u64,
    pub frozen: bool,
}

/// A slot holding any `Send + Sync + 'static` value.
pub struct TypedSlot {
    value: Box<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    pub meta: SlotMeta,
}

impl TypedSlot {
    /// Box `value` with its writer metadata.
    pub fn new<T: Any + Send + Sync>(value: T, writer: Writer, epoch: u64) -> Self {
        Self {
            value: Box::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            meta: SlotMeta {
                first_writer: writer.clone(),
                writer,
                epoch,
                frozen: false,
            },
        }
    }

    /// Whether the stored value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Borrow the value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Mutably borrow the value as `T`.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }

    /// Swap in a new value of the same key, keeping `first_writer`.
    pub(crate) fn replace<T: Any + Send + Sync>(&mut self, value: T, writer: Writer, epoch: u64) {
        self.value = Box::new(value);
        self.type_id = TypeId::of::<T>();
        self.type_name = std::any::type_name::<T>();
        self.meta.writer = writer;
        self.meta.epoch = epoch;
    }

    /// Type name of the stored value, for mismatch errors.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Debug for TypedSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedSlot")
            .field("type_name", &self.type_name)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
