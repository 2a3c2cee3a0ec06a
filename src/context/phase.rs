//! Scoped stage access to the request context.
//!
//! While a [`Phase`] is alive it holds `&mut RequestContext` and every write
//! is attributed to its stage. Dropping it records the end marker with the
//! elapsed time and restores the previous writer.

use std::time::Instant;

use super::slot::Writer;
use super::RequestContext;

/// RAII scope for one stage: records `>>phase:` on entry and `<<phase:` on drop.
pub struct Phase<'a> {
    ctx: &'a mut RequestContext,
    name: String,
    previous: Writer,
    started: Instant,
}

impl<'a> Phase<'a> {
    /// Open a phase and make `stage` the context's writer.
    pub fn begin(ctx: &'a mut RequestContext, stage: impl Into<String>, order: i32) -> Self {
        let name = stage.into();
        ctx.record_phase_start(&name);
        let previous = ctx.set_writer(Writer {
            stage: name.clone(),
            order,
        });
        Self {
            ctx,
            name,
            previous,
            started: Instant::now(),
        }
    }

    /// The context, for the stage to read and write.
    pub fn ctx(&mut self) -> &mut RequestContext {
        self.ctx
    }

    pub fn ctx_ref(&self) -> &RequestContext {
        self.ctx
    }

    /// Stage name this phase was opened for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Milliseconds since the phase opened.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Drop for Phase<'_> {
    fn drop(&mut self) {
        let elapsed = self.elapsed_ms();
        let previous = std::mem::replace(&mut self.previous, Writer::host());
        self.ctx.set_writer(previous);
        self.ctx.record_phase_end(&self.name, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextKey, RequestInfo};

    const NOTE: ContextKey<String> = ContextKey::new("note");

    #[test]
    fn test_phase_attributes_writes_and_traces() {
        let mut ctx = RequestContext::new(RequestInfo::new("u", "c", "hi", "t"));
        {
            let mut phase = Phase::begin(&mut ctx, "conductor", 0);
            assert_eq!(phase.name(), "conductor");
            phase.ctx().put(NOTE, "x".to_string()).unwrap();
        }
        assert_eq!(ctx.meta("note").unwrap().writer.stage, "conductor");
        assert_eq!(ctx.current_writer(), &Writer::host());

        let trace = ctx.trace();
        assert_eq!(trace[0], ">>phase:conductor");
        assert_eq!(trace[1], "note");
        assert!(trace[2].starts_with("<<phase:conductor:"));
        assert!(trace[2].ends_with("ms"));
    }

    #[test]
    fn test_sequential_phases_see_earlier_writes() {
        let mut ctx = RequestContext::new(RequestInfo::new("u", "c", "hi", "t"));
        {
            let mut p = Phase::begin(&mut ctx, "a", 0);
            p.ctx().put(NOTE, "from a".to_string()).unwrap();
        }
        {
            let p = Phase::begin(&mut ctx, "b", 10);
            assert_eq!(p.ctx_ref().get(NOTE).unwrap(), "from a");
        }
    }
}
