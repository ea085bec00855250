use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::warn;

use super::sprite::{Sprite, SpriteId, SpriteIdAllocator, Vec2};
use crate::actions::ActionDescriptor;
use crate::config::StageBounds;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

static STAGE_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_stage_lock_poison_once() {
    if STAGE_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!("stage lock poisoned; recovered inner value");
    }
}

/// Unordered sprite pair; `SpritePair::new(a, b) == SpritePair::new(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpritePair {
    low: SpriteId,
    high: SpriteId,
}

impl SpritePair {
    pub fn new(a: SpriteId, b: SpriteId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn ids(&self) -> (SpriteId, SpriteId) {
        (self.low, self.high)
    }

    pub fn contains(&self, id: SpriteId) -> bool {
        self.low == id || self.high == id
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionQueue {
    actions: Vec<ActionDescriptor>,
    revision: u64,
}

impl ActionQueue {
    pub fn actions(&self) -> &[ActionDescriptor] {
        &self.actions
    }

    /// Changes only when the queue is replaced wholesale by a swap.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageUpdate {
    Changed { sprite_id: SpriteId, state: Sprite },
    Removed { sprite_id: SpriteId },
}

impl StageUpdate {
    pub fn sprite_id(&self) -> SpriteId {
        match self {
            Self::Changed { sprite_id, .. } | Self::Removed { sprite_id } => *sprite_id,
        }
    }
}

/// Sprites, action queues and collision cooldowns for one stage.
#[derive(Debug)]
pub struct StageState {
    bounds: StageBounds,
    allocator: SpriteIdAllocator,
    sprites: Vec<Sprite>,
    queues: HashMap<SpriteId, ActionQueue>,
    cooldowns: HashSet<SpritePair>,
    next_queue_revision: u64,
    dirty: Vec<SpriteId>,
    removed: Vec<SpriteId>,
}

impl StageState {
    pub fn new(bounds: StageBounds) -> Self {
        Self {
            bounds,
            allocator: SpriteIdAllocator::default(),
            sprites: Vec::new(),
            queues: HashMap::new(),
            cooldowns: HashSet::new(),
            next_queue_revision: 0,
            dirty: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn bounds(&self) -> StageBounds {
        self.bounds
    }

    pub fn spawn_sprite(&mut self, label: impl Into<String>, position: Vec2) -> SpriteId {
        let id = self.allocator.allocate();
        let position = self.bounds.clamp(position);
        self.sprites.push(Sprite::new(id, label, position));
        let revision = self.alloc_revision();
        self.queues.insert(
            id,
            ActionQueue {
                actions: Vec::new(),
                revision,
            },
        );
        self.dirty.push(id);
        id
    }

    /// Removes the sprite together with its queue and every cooldown pair naming it.
    pub fn remove_sprite(&mut self, id: SpriteId) -> Option<Sprite> {
        let index = self.sprites.iter().position(|sprite| sprite.id == id)?;
        let sprite = self.sprites.remove(index);
        self.queues.remove(&id);
        self.cooldowns.retain(|pair| !pair.contains(id));
        self.dirty.retain(|dirty_id| *dirty_id != id);
        self.removed.push(id);
        Some(sprite)
    }

    pub fn clear(&mut self) {
        let ids: Vec<SpriteId> = self.sprites.iter().map(|sprite| sprite.id).collect();
        for id in ids {
            self.remove_sprite(id);
        }
        self.cooldowns.clear();
    }

    pub fn contains(&self, id: SpriteId) -> bool {
        self.sprites.iter().any(|sprite| sprite.id == id)
    }

    pub fn sprite_count(&self) -> usize {
        self.sprites.len()
    }

    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    pub fn sprite(&self, id: SpriteId) -> Option<&Sprite> {
        self.sprites.iter().find(|sprite| sprite.id == id)
    }

    /// Mutable access; the sprite is published to subscribers when the write scope ends.
    pub fn sprite_mut(&mut self, id: SpriteId) -> Option<&mut Sprite> {
        let sprite = self.sprites.iter_mut().find(|sprite| sprite.id == id)?;
        if !self.dirty.contains(&id) {
            self.dirty.push(id);
        }
        Some(sprite)
    }

    pub fn for_each_sprite_mut(&mut self, mut f: impl FnMut(&mut Sprite)) {
        for sprite in &mut self.sprites {
            f(sprite);
            if !self.dirty.contains(&sprite.id) {
                self.dirty.push(sprite.id);
            }
        }
    }

    pub fn queue(&self, id: SpriteId) -> Option<&ActionQueue> {
        self.queues.get(&id)
    }

    pub fn queue_actions(&self, id: SpriteId) -> &[ActionDescriptor] {
        self.queues
            .get(&id)
            .map(ActionQueue::actions)
            .unwrap_or_default()
    }

    pub fn push_action(&mut self, id: SpriteId, action: ActionDescriptor) -> bool {
        let Some(queue) = self.queues.get_mut(&id) else {
            return false;
        };
        queue.actions.push(action);
        true
    }

    pub fn remove_action(&mut self, id: SpriteId, index: usize) -> Option<ActionDescriptor> {
        let queue = self.queues.get_mut(&id)?;
        (index < queue.actions.len()).then(|| queue.actions.remove(index))
    }

    pub fn clear_actions(&mut self, id: SpriteId) -> bool {
        let Some(queue) = self.queues.get_mut(&id) else {
            return false;
        };
        queue.actions.clear();
        true
    }

    /// Exchanges both queues in one step. Each side gets a fresh revision so runners
    /// holding a cursor into the old contents notice the replacement.
    /// Returns the pre-swap queue lengths of `a` and `b`.
    pub fn swap_queues(&mut self, a: SpriteId, b: SpriteId) -> Option<(usize, usize)> {
        if a == b || !self.queues.contains_key(&a) || !self.queues.contains_key(&b) {
            return None;
        }
        let queue_a = self.queues.remove(&a).unwrap_or_default();
        let queue_b = self.queues.remove(&b).unwrap_or_default();
        let lengths = (queue_a.len(), queue_b.len());
        let revision_a = self.alloc_revision();
        let revision_b = self.alloc_revision();
        self.queues.insert(
            a,
            ActionQueue {
                actions: queue_b.actions,
                revision: revision_a,
            },
        );
        self.queues.insert(
            b,
            ActionQueue {
                actions: queue_a.actions,
                revision: revision_b,
            },
        );
        Some(lengths)
    }

    /// Sprites with at least one queued action, in stage order.
    pub fn active_sprite_ids(&self) -> Vec<SpriteId> {
        self.sprites
            .iter()
            .map(|sprite| sprite.id)
            .filter(|id| self.queues.get(id).is_some_and(|queue| !queue.is_empty()))
            .collect()
    }

    pub fn is_cooling_down(&self, pair: SpritePair) -> bool {
        self.cooldowns.contains(&pair)
    }

    /// Returns false when the pair was already cooling down.
    pub fn insert_cooldown(&mut self, pair: SpritePair) -> bool {
        self.cooldowns.insert(pair)
    }

    pub fn remove_cooldown(&mut self, pair: SpritePair) -> bool {
        self.cooldowns.remove(&pair)
    }

    pub fn cooldown_count(&self) -> usize {
        self.cooldowns.len()
    }

    fn alloc_revision(&mut self) -> u64 {
        self.next_queue_revision = self.next_queue_revision.saturating_add(1);
        self.next_queue_revision
    }

    fn drain_updates(&mut self) -> Vec<StageUpdate> {
        let mut updates = Vec::with_capacity(self.dirty.len() + self.removed.len());
        for id in self.dirty.drain(..) {
            if let Some(sprite) = self.sprites.iter().find(|sprite| sprite.id == id) {
                updates.push(StageUpdate::Changed {
                    sprite_id: id,
                    state: sprite.clone(),
                });
            }
        }
        updates.extend(
            self.removed
                .drain(..)
                .map(|sprite_id| StageUpdate::Removed { sprite_id }),
        );
        updates
    }
}

/// Shared handle to the stage. Every write scope is applied under one lock and its
/// sprite changes are broadcast after the lock is released.
#[derive(Clone, Debug)]
pub struct StageHandle {
    state: Arc<Mutex<StageState>>,
    updates: broadcast::Sender<StageUpdate>,
}

impl StageHandle {
    pub fn new(bounds: StageBounds) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(StageState::new(bounds))),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageUpdate> {
        self.updates.subscribe()
    }

    pub fn read<R>(&self, f: impl FnOnce(&StageState) -> R) -> R {
        let guard = self.lock();
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut StageState) -> R) -> R {
        let (result, updates) = {
            let mut guard = self.lock();
            let result = f(&mut guard);
            (result, guard.drain_updates())
        };
        for update in updates {
            // No subscribers is fine; rendering is optional.
            let _ = self.updates.send(update);
        }
        result
    }

    pub fn bounds(&self) -> StageBounds {
        self.read(StageState::bounds)
    }

    pub fn sprite(&self, id: SpriteId) -> Option<Sprite> {
        self.read(|state| state.sprite(id).cloned())
    }

    pub fn sprites(&self) -> Vec<Sprite> {
        self.read(|state| state.sprites().to_vec())
    }

    pub fn queue_actions(&self, id: SpriteId) -> Vec<ActionDescriptor> {
        self.read(|state| state.queue_actions(id).to_vec())
    }

    pub fn queue_revision(&self, id: SpriteId) -> Option<u64> {
        self.read(|state| state.queue(id).map(ActionQueue::revision))
    }

    fn lock(&self) -> MutexGuard<'_, StageState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_stage_lock_poison_once();
                poisoned.into_inner()
            }
        }
    }
}
