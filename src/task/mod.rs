// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Task pool and multilevel round-robin scheduling state
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests here; end-to-end schedules in kernel tests
//! PUBLIC API: TaskSet (alloc/prepare/run/sleep/rotate), TaskState, TaskError
//! DEPENDS_ON: arch::Context, config pool sizes, types::{TaskId, LevelId}
//! INVARIANTS: A Running task is a member of exactly one level; at most one
//!             task is physically executing; rotation order is insertion order
//! ADR: docs/adr/0001-kernel-core-boundaries.md
//!
//! The pool itself knows nothing about ticks or hardware switches: it keeps
//! membership, rotation and the dirty flag, and the kernel aggregate turns
//! a rotation result into an actual context switch. Level 0 is the highest
//! priority; a level with no running task is skipped; the idle task keeps
//! the lowest level permanently nonempty.

use core::marker::PhantomData;

use static_assertions::assert_not_impl_any;

use crate::arch::Context;
use crate::config::{self, LEVEL_CAP, MAX_LEVELS, MAX_TASKS};
use crate::types::{LevelId, TaskId};

/// Lifecycle state of a task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Unused,
    Sleeping,
    Running,
}

/// Error returned by task-pool operations.
#[must_use = "task errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// Every slot in the pool is taken.
    PoolExhausted,
    /// The handle names a slot that was never allocated.
    NotAllocated,
    /// The target level's member array is full. Static sizing is wrong;
    /// callers treat this as fatal.
    LevelFull,
}

struct Task {
    state: TaskState,
    level: LevelId,
    /// Time-slice length in ticks; doubles as the task's priority value.
    priority: u64,
    ctx: Context,
}

impl Task {
    const UNUSED: Self = Self {
        state: TaskState::Unused,
        level: LevelId::HIGHEST,
        priority: 1,
        ctx: Context::zeroed(),
    };
}

/// One priority class: members in insertion order plus the rotation cursor.
struct Level {
    members: [TaskId; LEVEL_CAP],
    len: usize,
    cursor: usize,
}

impl Level {
    const EMPTY: Self = Self { members: [TaskId::from_raw(0); LEVEL_CAP], len: 0, cursor: 0 };

    fn push(&mut self, id: TaskId) {
        self.members[self.len] = id;
        self.len += 1;
    }

    fn remove(&mut self, id: TaskId) {
        let Some(idx) = self.members[..self.len].iter().position(|&m| m == id) else {
            return;
        };
        for i in idx..self.len - 1 {
            self.members[i] = self.members[i + 1];
        }
        self.len -= 1;
        // Keep the cursor on the member it pointed at; removal at or before
        // the cursor naturally advances the rotation to the next member.
        if idx < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.len {
            self.cursor = 0;
        }
    }
}

/// The fixed task pool plus all scheduling state.
pub struct TaskSet {
    tasks: [Task; MAX_TASKS],
    levels: [Level; MAX_LEVELS],
    active_level: usize,
    dirty: bool,
    running: Option<TaskId>,
    switches: u64,
    // Single-core contract: this state never crosses an execution context
    // except under masked interrupts.
    _not_send_sync: PhantomData<*mut ()>,
}

assert_not_impl_any!(TaskSet: Send, Sync);

impl TaskSet {
    /// Creates a pool with every slot unused and nothing executing.
    pub const fn new() -> Self {
        Self {
            tasks: [Task::UNUSED; MAX_TASKS],
            levels: [Level::EMPTY; MAX_LEVELS],
            active_level: 0,
            dirty: false,
            running: None,
            switches: 0,
            _not_send_sync: PhantomData,
        }
    }

    /// Claims an unused slot; the task starts out Sleeping.
    #[must_use = "pool exhaustion must be handled"]
    pub fn alloc(&mut self) -> Result<TaskId, TaskError> {
        for (index, task) in self.tasks.iter_mut().enumerate() {
            if task.state == TaskState::Unused {
                *task = Task { state: TaskState::Sleeping, ..Task::UNUSED };
                task.priority = config::default_slice_ticks();
                return Ok(TaskId::from_raw(index as u16));
            }
        }
        Err(TaskError::PoolExhausted)
    }

    /// Seeds the saved context so the task starts at `entry` on `stack_top`
    /// the first time it is switched to.
    pub fn prepare(&mut self, id: TaskId, entry: usize, stack_top: usize) -> Result<(), TaskError> {
        let task = self.task_mut(id)?;
        task.ctx = Context::first_run(entry, stack_top);
        Ok(())
    }

    /// Makes `id` runnable.
    ///
    /// `level` of `None` keeps the task's current class, `priority` of
    /// `None` keeps its slice. Calling this on an already Running task
    /// re-levels it (and is a no-op membership-wise when the class does not
    /// change), which is also how a priority adjustment is expressed.
    pub fn run(
        &mut self,
        id: TaskId,
        level: Option<LevelId>,
        priority: Option<u64>,
    ) -> Result<(), TaskError> {
        let idx = self.index_of(id)?;
        if self.tasks[idx].state == TaskState::Unused {
            return Err(TaskError::NotAllocated);
        }

        let target = level.unwrap_or(self.tasks[idx].level);
        if let Some(slice) = priority {
            if slice > 0 {
                self.tasks[idx].priority = slice;
            }
        }

        if self.tasks[idx].state == TaskState::Running {
            if target != self.tasks[idx].level {
                if self.levels[target.as_index()].len >= LEVEL_CAP {
                    return Err(TaskError::LevelFull);
                }
                let old = self.tasks[idx].level;
                self.levels[old.as_index()].remove(id);
                self.levels[target.as_index()].push(id);
                self.tasks[idx].level = target;
                self.dirty = true;
            }
            return Ok(());
        }

        if self.levels[target.as_index()].len >= LEVEL_CAP {
            return Err(TaskError::LevelFull);
        }
        self.levels[target.as_index()].push(id);
        self.tasks[idx].level = target;
        self.tasks[idx].state = TaskState::Running;
        self.dirty = true;
        Ok(())
    }

    /// Returns a slot to the pool, detaching it from its level first.
    ///
    /// Releasing the task currently on the processor is the caller's bug;
    /// the kernel aggregate reschedules away from a task before ever
    /// releasing its slot.
    pub fn free(&mut self, id: TaskId) -> Result<(), TaskError> {
        let idx = self.index_of(id)?;
        match self.tasks[idx].state {
            TaskState::Unused => Err(TaskError::NotAllocated),
            TaskState::Running => {
                let level = self.tasks[idx].level;
                self.levels[level.as_index()].remove(id);
                self.dirty = true;
                self.tasks[idx] = Task::UNUSED;
                Ok(())
            }
            TaskState::Sleeping => {
                self.tasks[idx] = Task::UNUSED;
                Ok(())
            }
        }
    }

    /// Removes `id` from its level and puts it to sleep.
    ///
    /// Returns whether the slept task was the one physically executing, in
    /// which case the caller must reschedule immediately rather than wait
    /// for the next tick.
    pub fn sleep(&mut self, id: TaskId) -> Result<bool, TaskError> {
        let idx = self.index_of(id)?;
        match self.tasks[idx].state {
            TaskState::Unused => Err(TaskError::NotAllocated),
            TaskState::Sleeping => Ok(false),
            TaskState::Running => {
                let level = self.tasks[idx].level;
                self.levels[level.as_index()].remove(id);
                self.tasks[idx].state = TaskState::Sleeping;
                self.dirty = true;
                Ok(self.running == Some(id))
            }
        }
    }

    /// Selects the task that should hold the processor.
    ///
    /// A set dirty flag first re-derives the active level by scanning from
    /// the highest priority down. `advance` moves the rotation cursor one
    /// member on (the tick path); the immediate-reschedule path passes
    /// `false` because removal already moved the rotation along. Returns
    /// `None` only when every level is empty, which the caller treats as a
    /// fatal configuration error.
    pub fn rotate(&mut self, advance: bool) -> Option<TaskId> {
        if self.dirty {
            self.active_level = (0..MAX_LEVELS).find(|&l| self.levels[l].len > 0)?;
            self.dirty = false;
        }
        let level = &mut self.levels[self.active_level];
        if level.len == 0 {
            return None;
        }
        if advance {
            level.cursor = (level.cursor + 1) % level.len;
        } else if level.cursor >= level.len {
            level.cursor = 0;
        }
        Some(level.members[level.cursor])
    }

    /// Records `id` as the flow currently on the processor. Bring-up only;
    /// afterwards [`commit_switch`](Self::commit_switch) maintains it.
    pub fn set_executing(&mut self, id: TaskId) {
        self.running = Some(id);
    }

    /// The task physically executing, if bring-up has happened.
    pub fn executing(&self) -> Option<TaskId> {
        self.running
    }

    /// Books a hardware switch to `next`.
    pub fn commit_switch(&mut self, next: TaskId) {
        self.switches += 1;
        self.running = Some(next);
    }

    /// Hardware context switches performed since bring-up.
    pub fn switches(&self) -> u64 {
        self.switches
    }

    /// Lifecycle state of `id`; out-of-range handles read as Unused.
    pub fn state(&self, id: TaskId) -> TaskState {
        self.tasks.get(id.as_index()).map(|t| t.state).unwrap_or(TaskState::Unused)
    }

    /// Time slice of `id` in ticks.
    pub fn priority(&self, id: TaskId) -> u64 {
        self.tasks.get(id.as_index()).map(|t| t.priority).unwrap_or(1)
    }

    /// Running-task count of a level.
    pub fn level_len(&self, level: LevelId) -> usize {
        self.levels[level.as_index()].len
    }

    /// Raw context pointers for the switch primitive. The two handles must
    /// differ; the borrows are split into raws because the hardware swap
    /// needs both halves of the pool at once.
    pub(crate) fn context_pair(
        &mut self,
        save: TaskId,
        load: TaskId,
    ) -> (*mut Context, *const Context) {
        debug_assert_ne!(save, load);
        let save_ptr: *mut Context = &mut self.tasks[save.as_index()].ctx;
        let load_ptr: *const Context = &self.tasks[load.as_index()].ctx;
        (save_ptr, load_ptr)
    }

    fn index_of(&self, id: TaskId) -> Result<usize, TaskError> {
        let idx = id.as_index();
        if idx < MAX_TASKS {
            Ok(idx)
        } else {
            Err(TaskError::NotAllocated)
        }
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, TaskError> {
        let idx = self.index_of(id)?;
        if self.tasks[idx].state == TaskState::Unused {
            return Err(TaskError::NotAllocated);
        }
        Ok(&mut self.tasks[idx])
    }
}

impl Default for TaskSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable(set: &mut TaskSet, level: u8, priority: u64) -> TaskId {
        let id = set.alloc().unwrap();
        set.run(id, LevelId::new(level), Some(priority)).unwrap();
        id
    }

    #[test]
    fn rotation_is_insertion_order() {
        let mut set = TaskSet::new();
        let a = runnable(&mut set, 0, 2);
        let b = runnable(&mut set, 0, 2);
        let c = runnable(&mut set, 0, 2);

        assert_eq!(set.rotate(false), Some(a));
        assert_eq!(set.rotate(true), Some(b));
        assert_eq!(set.rotate(true), Some(c));
        assert_eq!(set.rotate(true), Some(a)); // wraps
    }

    #[test]
    fn higher_level_wins_after_dirty_recompute() {
        let mut set = TaskSet::new();
        let low = runnable(&mut set, 3, 2);
        assert_eq!(set.rotate(true), Some(low));

        let high = runnable(&mut set, 1, 2);
        assert_eq!(set.rotate(true), Some(high));
        // Stays on the higher level until membership changes again.
        assert_eq!(set.rotate(true), Some(high));

        set.sleep(high).unwrap();
        assert_eq!(set.rotate(true), Some(low));
    }

    #[test]
    fn empty_levels_are_skipped() {
        let mut set = TaskSet::new();
        let only = runnable(&mut set, 7, 2);
        assert_eq!(set.rotate(true), Some(only));
    }

    #[test]
    fn all_levels_empty_selects_nothing() {
        let mut set = TaskSet::new();
        assert_eq!(set.rotate(true), None);
        let id = runnable(&mut set, 0, 2);
        set.sleep(id).unwrap();
        assert_eq!(set.rotate(true), None);
    }

    #[test]
    fn sleep_compacts_and_keeps_rotation_position() {
        let mut set = TaskSet::new();
        let a = runnable(&mut set, 0, 2);
        let b = runnable(&mut set, 0, 2);
        let c = runnable(&mut set, 0, 2);

        assert_eq!(set.rotate(false), Some(a));
        set.sleep(a).unwrap();
        // Removal moved the rotation onto b without an explicit advance.
        assert_eq!(set.rotate(false), Some(b));
        assert_eq!(set.rotate(true), Some(c));
        assert_eq!(set.rotate(true), Some(b));
    }

    #[test]
    fn sleeping_the_executing_task_demands_reschedule() {
        let mut set = TaskSet::new();
        let a = runnable(&mut set, 0, 2);
        let b = runnable(&mut set, 0, 2);
        set.set_executing(a);

        assert_eq!(set.sleep(b), Ok(false));
        assert_eq!(set.sleep(a), Ok(true));
        assert_eq!(set.sleep(a), Ok(false)); // already sleeping
    }

    #[test]
    fn wake_keeps_level_and_priority() {
        let mut set = TaskSet::new();
        let id = runnable(&mut set, 4, 9);
        set.sleep(id).unwrap();

        set.run(id, None, None).unwrap();
        assert_eq!(set.state(id), TaskState::Running);
        assert_eq!(set.priority(id), 9);
        assert_eq!(set.level_len(LevelId::new(4).unwrap()), 1);
    }

    #[test]
    fn releveling_a_running_task_moves_membership() {
        let mut set = TaskSet::new();
        let id = runnable(&mut set, 2, 3);
        set.run(id, LevelId::new(5), None).unwrap();
        assert_eq!(set.level_len(LevelId::new(2).unwrap()), 0);
        assert_eq!(set.level_len(LevelId::new(5).unwrap()), 1);
    }

    #[test]
    fn level_capacity_is_enforced() {
        let mut set = TaskSet::new();
        for _ in 0..LEVEL_CAP {
            let _ = runnable(&mut set, 0, 2);
        }
        let extra = set.alloc().unwrap();
        assert_eq!(set.run(extra, LevelId::new(0), None), Err(TaskError::LevelFull));
        // The rejected task is untouched and can run elsewhere.
        assert_eq!(set.state(extra), TaskState::Sleeping);
        set.run(extra, LevelId::new(1), None).unwrap();
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let mut set = TaskSet::new();
        for _ in 0..MAX_TASKS {
            assert!(set.alloc().is_ok());
        }
        assert_eq!(set.alloc(), Err(TaskError::PoolExhausted));
    }

    #[test]
    fn freed_slots_are_reusable() {
        let mut set = TaskSet::new();
        let id = runnable(&mut set, 0, 2);
        set.free(id).unwrap();
        assert_eq!(set.state(id), TaskState::Unused);
        assert_eq!(set.level_len(LevelId::HIGHEST), 0);
        assert_eq!(set.alloc(), Ok(id));
    }

    #[test]
    fn priority_zero_keeps_the_old_slice() {
        let mut set = TaskSet::new();
        let id = runnable(&mut set, 0, 6);
        set.run(id, None, Some(0)).unwrap();
        assert_eq!(set.priority(id), 6);
    }
}
