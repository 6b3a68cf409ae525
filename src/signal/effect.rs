use crate::runtime::{EffectScope, ReactiveRuntime, TriggerEvent};
use std::sync::Arc;

/// A side effect that runs when its dependencies change.
pub struct Effect {
    run: Arc<dyn Fn(&TriggerEvent) + Send + Sync>,
    id: usize,
    runtime: Arc<ReactiveRuntime>,
}

impl Effect {
    fn new<F>(effect: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let this = Self::on_trigger(move |_| effect());
        let initial = TriggerEvent {
            source: this.id,
            observer: this.id,
        };

        // Run immediately within the observer context to track dependencies
        this.runtime
            .with_observer(this.id, || (this.run)(&initial));
        this
    }

    /// Create an effect that does not run now and has no sources yet.
    ///
    /// Sources are attached with [`Effect::watch`]; `f` then receives the
    /// trigger event each time one of them changes.
    pub fn on_trigger<F>(f: F) -> Self
    where
        F: Fn(&TriggerEvent) + Send + Sync + 'static,
    {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();
        let run: Arc<dyn Fn(&TriggerEvent) + Send + Sync> = Arc::new(f);

        runtime.create_observer(id, Arc::clone(&run));
        EffectScope::record(id);

        Self { run, id, runtime }
    }

    /// Start reacting to changes of the source with id `source_id`.
    pub fn watch(&self, source_id: usize) {
        self.runtime.track(self.id, source_id);
    }

    /// Detach the effect from the runtime; it never runs again on changes.
    pub fn stop(&self) {
        self.runtime.remove_observer(self.id);
    }

    pub fn id(&self) -> usize {
        self.id
    }
}

/// Create a new effect that runs when dependencies change.
///
/// The effect runs immediately and then again whenever any signal
/// it read during that first run changes.
///
/// # Example
///
/// ```
/// use pantry::{create_effect, Signal};
///
/// let count = Signal::new(0);
/// create_effect({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
/// count.set(1);
/// ```
pub fn create_effect<F>(effect: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(effect)
}
