//! Storage for everything that can take part in a reference cycle.
//!
//! Closures point at environments, environments hold values, and instance
//! fields can point back at the instance itself. Those objects live in
//! arenas owned by [`Heap`] and are referred to by plain index handles, so
//! cycles are just numbers and a mark-and-sweep pass reclaims whatever the
//! interpreter can no longer reach.

use crate::config::Config;
use crate::environment::Environment;
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::ops::{Index, IndexMut};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EnvRef(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceRef(usize);

pub type Fields = FxHashMap<String, Value>;

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    marked: bool,
}

/// A slab of `T` with a free list. Freed slots are reused by later allocations.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn alloc(&mut self, value: T) -> usize {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index].value = Some(value);
                index
            }
            None => {
                self.slots.push(Slot {
                    value: Some(value),
                    marked: false,
                });
                self.slots.len() - 1
            }
        }
    }
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(|slot| slot.value.as_ref())
    }
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(|slot| slot.value.as_mut())
    }
    pub fn len(&self) -> usize {
        self.live
    }
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
    /// Marks the slot and returns true if it was not marked before.
    fn mark(&mut self, index: usize) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.value.is_some() && !slot.marked => {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }
    /// Frees every unmarked slot, clears the marks, and returns how many were freed.
    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.marked {
                slot.marked = false;
            } else if slot.value.take().is_some() {
                self.free.push(index);
                freed += 1;
            }
        }
        self.live -= freed;
        freed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub live_environments: usize,
    pub live_instances: usize,
    pub freed_environments: usize,
    pub freed_instances: usize,
}

enum Gray {
    Env(EnvRef),
    Instance(InstanceRef),
}

#[derive(Debug)]
pub struct Heap {
    environments: Arena<Environment>,
    instances: Arena<Fields>,
    allocations: usize,
    threshold: usize,
    min_threshold: usize,
    growth_factor: usize,
}

impl Heap {
    pub fn new(config: &Config) -> Heap {
        Heap {
            environments: Arena::default(),
            instances: Arena::default(),
            allocations: 0,
            threshold: config.gc_threshold,
            min_threshold: config.gc_threshold,
            growth_factor: config.gc_growth_factor,
        }
    }
    pub fn alloc_environment(&mut self, environment: Environment) -> EnvRef {
        self.allocations += 1;
        EnvRef(self.environments.alloc(environment))
    }
    pub fn alloc_instance(&mut self) -> InstanceRef {
        self.allocations += 1;
        InstanceRef(self.instances.alloc(Fields::default()))
    }
    pub fn should_collect(&self) -> bool {
        self.allocations >= self.threshold
    }
    /// Marks everything reachable from the given roots and frees the rest.
    pub fn collect<'v>(
        &mut self,
        env_roots: &[EnvRef],
        value_roots: impl IntoIterator<Item = &'v Value>,
    ) -> GcStats {
        let mut gray: Vec<Gray> = env_roots.iter().map(|r| Gray::Env(*r)).collect();
        for value in value_roots {
            trace_value(value, &mut gray);
        }

        while let Some(object) = gray.pop() {
            match object {
                Gray::Env(r) => {
                    if !self.environments.mark(r.0) {
                        continue;
                    }
                    if let Some(environment) = self.environments.get(r.0) {
                        if let Some(enclosing) = environment.enclosing() {
                            gray.push(Gray::Env(enclosing));
                        }
                        for value in environment.values() {
                            trace_value(value, &mut gray);
                        }
                    }
                }
                Gray::Instance(r) => {
                    if !self.instances.mark(r.0) {
                        continue;
                    }
                    if let Some(fields) = self.instances.get(r.0) {
                        for value in fields.values() {
                            trace_value(value, &mut gray);
                        }
                    }
                }
            }
        }

        let freed_environments = self.environments.sweep();
        let freed_instances = self.instances.sweep();
        let live = self.environments.len() + self.instances.len();
        self.allocations = 0;
        self.threshold = self
            .min_threshold
            .max(live.saturating_mul(self.growth_factor));

        let stats = GcStats {
            live_environments: self.environments.len(),
            live_instances: self.instances.len(),
            freed_environments,
            freed_instances,
        };
        tracing::debug!(
            live_environments = stats.live_environments,
            live_instances = stats.live_instances,
            freed_environments,
            freed_instances,
            next_threshold = self.threshold,
            "collected garbage"
        );
        stats
    }
}

fn trace_value(value: &Value, gray: &mut Vec<Gray>) {
    match value {
        Value::Function(function) => gray.push(Gray::Env(function.closure)),
        Value::Class(class) => {
            let mut next = Some(class);
            while let Some(class) = next {
                for method in class.methods.values() {
                    gray.push(Gray::Env(method.closure));
                }
                next = class.superclass.as_ref();
            }
        }
        Value::Instance(instance) => {
            gray.push(Gray::Instance(instance.id));
            trace_value(&Value::Class(instance.class.clone()), gray);
        }
        Value::Nil
        | Value::Boolean(_)
        | Value::Number(_)
        | Value::String(_)
        | Value::Native(_) => (),
    }
}

// Handles only come from `alloc_*` and the collector never frees a reachable
// object, so indexing a freed slot is an interpreter bug rather than a Lox
// error.
impl Index<EnvRef> for Heap {
    type Output = Environment;
    fn index(&self, r: EnvRef) -> &Environment {
        match self.environments.get(r.0) {
            Some(environment) => environment,
            None => panic!("dangling environment handle {}", r.0),
        }
    }
}

impl IndexMut<EnvRef> for Heap {
    fn index_mut(&mut self, r: EnvRef) -> &mut Environment {
        match self.environments.get_mut(r.0) {
            Some(environment) => environment,
            None => panic!("dangling environment handle {}", r.0),
        }
    }
}

impl Index<InstanceRef> for Heap {
    type Output = Fields;
    fn index(&self, r: InstanceRef) -> &Fields {
        match self.instances.get(r.0) {
            Some(fields) => fields,
            None => panic!("dangling instance handle {}", r.0),
        }
    }
}

impl IndexMut<InstanceRef> for Heap {
    fn index_mut(&mut self, r: InstanceRef) -> &mut Fields {
        match self.instances.get_mut(r.0) {
            Some(fields) => fields,
            None => panic!("dangling instance handle {}", r.0),
        }
    }
}

#[cfg(test)]
mod heap_tests {
    use super::{Arena, Heap};
    use crate::config::Config;
    use crate::environment::Environment;
    use crate::value::Value;

    #[test]
    fn arena_reuses_freed_slots() {
        let mut arena: Arena<i32> = Arena::default();
        let a = arena.alloc(1);
        let b = arena.alloc(2);
        assert_eq!(arena.len(), 2);
        arena.mark(b);
        assert_eq!(arena.sweep(), 1);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&2));
        let c = arena.alloc(3);
        assert_eq!(c, a);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn unreachable_environments_are_freed() {
        let mut heap = Heap::new(&Config::default());
        let globals = heap.alloc_environment(Environment::new(None));
        let child = heap.alloc_environment(Environment::new(Some(globals)));
        heap.alloc_environment(Environment::new(Some(child)));
        let stats = heap.collect(&[child], std::iter::empty());
        assert_eq!(stats.live_environments, 2);
        assert_eq!(stats.freed_environments, 1);
    }

    #[test]
    fn self_referencing_instance_is_freed() {
        let mut heap = Heap::new(&Config::default());
        let globals = heap.alloc_environment(Environment::new(None));
        let instance = heap.alloc_instance();
        // The instance's own field refers back to its field table.
        let class = std::rc::Rc::new(crate::class::Class::new(
            "A".to_string(),
            None,
            Default::default(),
        ));
        let value = Value::Instance(crate::instance::Instance {
            id: instance,
            class,
        });
        heap[instance].insert("me".to_string(), value.clone());

        let stats = heap.collect(&[globals], [&value]);
        assert_eq!(stats.live_instances, 1);

        let stats = heap.collect(&[globals], std::iter::empty());
        assert_eq!(stats.live_instances, 0);
        assert_eq!(stats.freed_instances, 1);
    }

    #[test]
    fn threshold_grows_with_live_objects() {
        let config = Config::default().gc_threshold(2).gc_growth_factor(2);
        let mut heap = Heap::new(&config);
        let mut roots = Vec::new();
        for _ in 0..4 {
            roots.push(heap.alloc_environment(Environment::new(None)));
        }
        assert!(heap.should_collect());
        heap.collect(&roots, std::iter::empty());
        assert!(!heap.should_collect());
        for _ in 0..7 {
            heap.alloc_environment(Environment::new(None));
        }
        assert!(!heap.should_collect());
        heap.alloc_environment(Environment::new(None));
        assert!(heap.should_collect());
    }
}
