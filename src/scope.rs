//! Frame-scoped and RAII ownership.
//!
//! Two lifetime regimes compose over the same object graph. A [`Scoped`]
//! wrapper in RAII mode releases its object when the wrapper drops; in frame
//! mode the object is parked in the current [`push_frame`] scope and released
//! in reverse registration order when that frame is popped. Borrowed wrappers
//! never release anything.
//!
//! The frame stack and the RAII registry live in a thread-local runtime
//! rather than a process-wide global, so each thread gets an independent
//! `<global>` frame pushed on first use and drained when the thread exits.
//! A frame entry is the sole owner of its object; the wrapper carries a
//! liveness-checked pointer into the entry, so the object is destroyed at
//! pop time even while wrappers are still in scope, and dereferencing a
//! wrapper after its frame was popped panics.

use std::{
    any::Any,
    cell::RefCell,
    collections::HashMap,
    ptr::NonNull,
    sync::{Arc, Weak},
};

use crate::{
    buffer::{Buffer, BufferConfig},
    context::Context,
    error::Result,
    image::{DepthImage, DepthImageConfig, Image, ImageConfig},
    pass::{RenderPass, RenderPassConfig},
    task::{ComputeTaskConfig, GraphicsTaskConfig, Task},
};

const GLOBAL_FRAME: &str = "<global>";

struct GcEntry {
    kind: &'static str,
    obj: Box<dyn Any>,
}

struct Frame {
    label: String,
    entries: Vec<GcEntry>,
}

struct Runtime {
    frames: Vec<Frame>,
    raii: HashMap<u64, &'static str>,
    next_raii_id: u64,
}

impl Runtime {
    fn new() -> Self {
        Self {
            frames: vec![Frame {
                label: GLOBAL_FRAME.to_owned(),
                entries: Vec::new(),
            }],
            raii: HashMap::new(),
            next_raii_id: 0,
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        for kind in self.raii.values() {
            tracing::warn!(kind, "object leaked at teardown");
        }
        while let Some(mut frame) = self.frames.pop() {
            if frame.label != GLOBAL_FRAME {
                tracing::warn!(label = frame.label, "frame never popped");
            }
            for entry in frame.entries.drain(..).rev() {
                if frame.label == GLOBAL_FRAME {
                    tracing::warn!(kind = entry.kind, "object leaked at teardown");
                }
                drop(entry);
            }
        }
    }
}

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    RUNTIME.with(|runtime| f(&mut runtime.borrow_mut()))
}

/// Pushes a named frame. Objects built in frame mode register here until the
/// matching [`pop_frame`].
pub fn push_frame(label: impl Into<String>) {
    let label = label.into();
    tracing::debug!(label, "push frame");
    with_runtime(|runtime| {
        runtime.frames.push(Frame {
            label,
            entries: Vec::new(),
        })
    });
}

/// Pops the top frame, releasing its objects in reverse registration order.
///
/// Panics when `label` does not match the top frame; popping out of order is
/// a programming error.
pub fn pop_frame(label: &str) {
    let mut frame = with_runtime(|runtime| {
        assert!(
            runtime.frames.len() > 1,
            "cannot pop the {GLOBAL_FRAME} frame"
        );
        let top = runtime.frames.last().unwrap();
        assert!(
            top.label == label,
            "pop_frame label mismatch: expected {:?}, got {label:?}",
            top.label,
        );
        runtime.frames.pop().unwrap()
    });
    tracing::debug!(label, entries = frame.entries.len(), "pop frame");
    for entry in frame.entries.drain(..).rev() {
        drop(entry);
    }
}

/// Number of objects currently registered in RAII mode on this thread.
pub fn live_raii_objects() -> usize {
    with_runtime(|runtime| runtime.raii.len())
}

enum Ownership<T> {
    Borrowed(T),
    Raii { inner: T, id: u64 },
    // The frame entry holds the only strong Arc; `ptr` targets its payload
    // and `alive` observes whether the entry was dropped.
    Frame { ptr: NonNull<T>, alive: Weak<T> },
}

/// A core object under one of the three ownership regimes.
pub struct Scoped<T> {
    ownership: Ownership<T>,
}

impl<T: Clone + Any> Scoped<T> {
    /// Wraps `inner` in RAII mode (`gc` false) or frame mode (`gc` true).
    ///
    /// In frame mode the current frame takes sole ownership: the object is
    /// destroyed when that frame is popped, whether or not the wrapper is
    /// still alive. The wrapper must not be dereferenced after the pop.
    pub fn new(inner: T, gc: bool) -> Self {
        let kind = std::any::type_name::<T>();
        let ownership = if gc {
            let shared = Arc::new(inner);
            let alive = Arc::downgrade(&shared);
            let ptr = NonNull::from(&*shared);
            with_runtime(|runtime| {
                runtime
                    .frames
                    .last_mut()
                    .unwrap()
                    .entries
                    .push(GcEntry {
                        kind,
                        obj: Box::new(shared),
                    })
            });
            Ownership::Frame { ptr, alive }
        } else {
            let id = with_runtime(|runtime| {
                let id = runtime.next_raii_id;
                runtime.next_raii_id += 1;
                runtime.raii.insert(id, kind);
                id
            });
            Ownership::Raii { inner, id }
        };
        Self { ownership }
    }

    /// Wraps a reference to an existing object; dropping the wrapper releases
    /// nothing.
    pub fn borrowed(inner: &T) -> Self {
        Self {
            ownership: Ownership::Borrowed(inner.clone()),
        }
    }
}

impl<T> std::ops::Deref for Scoped<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        match &self.ownership {
            Ownership::Borrowed(inner) | Ownership::Raii { inner, .. } => inner,
            Ownership::Frame { ptr, alive } => {
                assert!(
                    alive.strong_count() > 0,
                    "frame-scoped object used after its frame was popped"
                );
                // Safety: the frame entry owns the Arc this pointer targets
                // and the strong count above proves the entry is still alive.
                // Frames are thread-local, so the entry cannot be dropped
                // while this reference is handed out.
                unsafe { ptr.as_ref() }
            }
        }
    }
}

impl<T> Drop for Scoped<T> {
    fn drop(&mut self) {
        if let Ownership::Raii { id, .. } = self.ownership {
            let registered = with_runtime(|runtime| runtime.raii.remove(&id).is_some());
            if !registered {
                tracing::warn!(
                    kind = std::any::type_name::<T>(),
                    "destroy of unregistered object"
                );
            }
        }
        // Borrowed wrappers hold a shared clone; frame wrappers hold no
        // ownership at all, the frame entry releases the object at pop.
    }
}

impl BufferConfig {
    pub fn build(self, ctx: &Context, gc: bool) -> Result<Scoped<Buffer>> {
        Ok(Scoped::new(Buffer::new(ctx, self)?, gc))
    }
}

impl ImageConfig {
    pub fn build(self, ctx: &Context, gc: bool) -> Result<Scoped<Image>> {
        Ok(Scoped::new(Image::new(ctx, self)?, gc))
    }
}

impl DepthImageConfig {
    pub fn build(self, ctx: &Context, gc: bool) -> Result<Scoped<DepthImage>> {
        Ok(Scoped::new(DepthImage::new(ctx, self)?, gc))
    }
}

impl RenderPassConfig {
    pub fn build(self, ctx: &Context, gc: bool) -> Result<Scoped<RenderPass>> {
        Ok(Scoped::new(RenderPass::new(ctx, self)?, gc))
    }
}

impl ComputeTaskConfig {
    pub fn build(self, ctx: &Context, gc: bool) -> Result<Scoped<Task>> {
        Ok(Scoped::new(Task::new_compute(ctx, self)?, gc))
    }
}

impl GraphicsTaskConfig {
    pub fn build(self, ctx: &Context, pass: &RenderPass, gc: bool) -> Result<Scoped<Task>> {
        Ok(Scoped::new(Task::new_graphics(ctx, pass, self)?, gc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct Probe(Arc<ProbeInner>);
    struct ProbeInner {
        log: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    }
    impl Drop for ProbeInner {
        fn drop(&mut self) {
            self.log.lock().unwrap().push(self.name);
        }
    }
    fn probe(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Probe {
        Probe(Arc::new(ProbeInner {
            log: log.clone(),
            name,
        }))
    }

    #[test]
    fn test_frame_pop_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        push_frame("outer");
        let _a = Scoped::new(probe(&log, "a"), true);
        let _b = Scoped::new(probe(&log, "b"), true);
        let _c = Scoped::new(probe(&log, "c"), true);
        push_frame("inner");
        let _d = Scoped::new(probe(&log, "d"), true);
        let _e = Scoped::new(probe(&log, "e"), true);
        assert_eq!(_e.0.name, "e");
        // The wrappers are still in scope; the pop alone destroys d and e.
        pop_frame("inner");
        assert_eq!(*log.lock().unwrap(), ["e", "d"]);
        pop_frame("outer");
        assert_eq!(*log.lock().unwrap(), ["e", "d", "c", "b", "a"]);
    }

    #[test]
    #[should_panic(expected = "after its frame was popped")]
    fn test_use_after_pop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        push_frame("gone");
        let wrapper = Scoped::new(probe(&log, "g"), true);
        pop_frame("gone");
        assert_eq!(*log.lock().unwrap(), ["g"]);
        let _ = wrapper.0.name;
    }

    /// The wrapper dropping before the pop must not release the object; the
    /// frame entry holds it until then.
    #[test]
    fn test_frame_entry_outlives_wrapper() {
        let log = Arc::new(Mutex::new(Vec::new()));
        push_frame("frame");
        {
            let _wrapper = Scoped::new(probe(&log, "x"), true);
        }
        assert!(log.lock().unwrap().is_empty());
        pop_frame("frame");
        assert_eq!(*log.lock().unwrap(), ["x"]);
    }

    #[test]
    fn test_raii_release() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let before = live_raii_objects();
        {
            let _wrapper = Scoped::new(probe(&log, "r"), false);
            assert_eq!(live_raii_objects(), before + 1);
        }
        assert_eq!(live_raii_objects(), before);
        assert_eq!(*log.lock().unwrap(), ["r"]);
    }

    #[test]
    fn test_borrowed_releases_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let owner = probe(&log, "o");
        {
            let _borrow = Scoped::borrowed(&owner);
        }
        assert!(log.lock().unwrap().is_empty());
        drop(owner);
        assert_eq!(*log.lock().unwrap(), ["o"]);
    }

    #[test]
    #[should_panic(expected = "pop_frame label mismatch")]
    fn test_pop_label_mismatch() {
        push_frame("alpha");
        pop_frame("beta");
    }

    /// A frame-owned parent may reference a RAII child and an earlier
    /// frame-owned child; both orders release the parent first.
    #[test]
    fn test_mixed_regimes_compose() {
        let log = Arc::new(Mutex::new(Vec::new()));
        push_frame("mixed");
        let _child = Scoped::new(probe(&log, "child"), true);
        {
            let _parent = Scoped::new(probe(&log, "raii-parent"), false);
        }
        assert_eq!(*log.lock().unwrap(), ["raii-parent"]);
        pop_frame("mixed");
        assert_eq!(*log.lock().unwrap(), ["raii-parent", "child"]);
    }
}
