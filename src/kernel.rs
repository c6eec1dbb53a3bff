// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Kernel aggregate: the four subsystems wired together.
//!
//! Owns the memory manager, queue arena, timer pool and task pool, and
//! implements the paths that cross them: the periodic tick entry, queue
//! delivery with its wake side effect, and the sleep/preempt reschedules.
//! Boot code brings the aggregate up once and then only re-enters it from
//! the tick interrupt and from tasks invoking the public operations.

use crate::arch;
use crate::mm::{self, AllocError, RegionAllocator};
use crate::queue::{QueueError, QueueTable};
use crate::task::{TaskError, TaskSet, TaskState};
use crate::timer::{FireAction, TimerError, TimerSet};
use crate::types::{LevelId, QueueId, TaskId, TimerId};

/// Error returned by aggregate operations that cross subsystems.
#[must_use = "kernel errors must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Backing-storage allocation failed.
    Memory(AllocError),
    /// Task-pool operation failed.
    Task(TaskError),
    /// Timer-pool operation failed.
    Timer(TimerError),
    /// Queue operation failed.
    Queue(QueueError),
}

impl From<AllocError> for KernelError {
    fn from(value: AllocError) -> Self {
        Self::Memory(value)
    }
}

impl From<TaskError> for KernelError {
    fn from(value: TaskError) -> Self {
        Self::Task(value)
    }
}

impl From<TimerError> for KernelError {
    fn from(value: TimerError) -> Self {
        Self::Timer(value)
    }
}

impl From<QueueError> for KernelError {
    fn from(value: QueueError) -> Self {
        Self::Queue(value)
    }
}

/// The kernel core: one memory region, one tick source, one processor.
pub struct Kernel {
    mm: RegionAllocator,
    queues: QueueTable,
    timers: TimerSet,
    tasks: TaskSet,
    slice_timer: Option<TimerId>,
}

impl Kernel {
    /// Creates an aggregate with empty pools; nothing runs until
    /// [`init`](Self::init).
    pub const fn new() -> Self {
        Self {
            mm: RegionAllocator::new(),
            queues: QueueTable::new(),
            timers: TimerSet::new(),
            tasks: TaskSet::new(),
            slice_timer: None,
        }
    }

    /// Brings the core up over `region_base .. region_base + region_size`.
    ///
    /// Installs the calling flow as the boot task on the highest level,
    /// installs the idle task on the lowest so a level is always nonempty,
    /// and arms the slice timer. Returns the boot task's handle. The pools
    /// placed here live for the rest of the boot; nothing is ever handed
    /// back to the memory manager.
    ///
    /// # Safety
    ///
    /// The region must be ordinary RAM, valid for reads and writes for the
    /// `'static` lifetime and referenced by nothing else: task stacks and
    /// queue buffers are carved out of it and dereferenced.
    pub unsafe fn init(
        &mut self,
        region_base: usize,
        region_size: usize,
    ) -> Result<TaskId, KernelError> {
        self.mm.init(region_base, region_size);

        let boot = self.tasks.alloc()?;
        self.tasks.run(boot, Some(LevelId::HIGHEST), None)?;
        self.tasks.set_executing(boot);

        let idle = self.tasks.alloc()?;
        let idle_entry: fn() = idle_main;
        let idle_stack = self.mm.alloc_4k(IDLE_STACK_BYTES)?;
        self.tasks.prepare(idle, idle_entry as usize, idle_stack + IDLE_STACK_BYTES)?;
        self.tasks.run(idle, Some(LevelId::LOWEST), Some(1))?;

        let slice = self.timers.alloc()?;
        self.timers.bind_preempt(slice)?;
        self.timers.arm(slice, self.tasks.priority(boot))?;
        self.slice_timer = Some(slice);

        log_info!(
            target: "kernel",
            "core up: region {:#x}+{:#x}, boot task {}",
            region_base,
            region_size,
            boot
        );
        Ok(boot)
    }

    /// Entry point for the periodic hardware tick.
    ///
    /// Advances time, then drains every slot expiring on this tick: queue
    /// deliveries happen inline (including their wake side effect) and the
    /// privileged slot re-enters the scheduler, all before this returns.
    pub fn on_tick(&mut self) {
        self.timers.advance();
        while let Some(firing) = self.timers.pop_due() {
            match firing.action {
                FireAction::Deliver { queue, payload } => {
                    // A full queue already recorded its overrun; a producer
                    // in interrupt context has nobody to report it to.
                    let _ = self.post(queue, payload);
                }
                FireAction::Preempt => self.reschedule(true),
            }
        }
    }

    /// Delivers `value` into `queue`, waking the bound task if it sleeps.
    ///
    /// The one mechanism by which interrupt context hands data to task
    /// context; input-device handlers call this directly.
    pub fn post(&mut self, queue: QueueId, value: u32) -> Result<(), QueueError> {
        let wake = self.queues.put(queue, value)?;
        if let Some(id) = wake {
            if self.tasks.state(id) == TaskState::Sleeping {
                if let Err(err) = self.tasks.run(id, None, None) {
                    log_error!(target: "kernel", "wake of task {} failed: {:?}", id, err);
                }
            }
        }
        Ok(())
    }

    /// Removes the oldest value from `queue`; `None` means empty.
    pub fn fetch(&mut self, queue: QueueId) -> Result<Option<u32>, QueueError> {
        self.queues.get(queue)
    }

    /// Puts `id` to sleep. A task sleeping itself gives up the processor
    /// before this returns; there is no blocking `fetch`, so "wait for
    /// data" is exactly this plus a queue with the task as wake target.
    pub fn sleep(&mut self, id: TaskId) -> Result<(), TaskError> {
        let was_executing = self.tasks.sleep(id)?;
        if was_executing {
            self.reschedule(false);
        }
        Ok(())
    }

    /// Makes a Sleeping task runnable again in its previous level.
    pub fn wake(&mut self, id: TaskId) -> Result<(), TaskError> {
        if self.tasks.state(id) == TaskState::Sleeping {
            self.tasks.run(id, None, None)
        } else {
            Ok(())
        }
    }

    /// Allocates a task with a fresh stack and makes it runnable.
    pub fn spawn(
        &mut self,
        entry: usize,
        stack_bytes: usize,
        level: LevelId,
        priority: u64,
    ) -> Result<TaskId, KernelError> {
        let stack = self.mm.alloc_4k(stack_bytes)?;
        let id = match self.tasks.alloc() {
            Ok(id) => id,
            Err(err) => {
                self.mm.free_4k(stack, stack_bytes);
                return Err(err.into());
            }
        };
        let result = self
            .tasks
            .prepare(id, entry, stack + mm::round_to_page(stack_bytes))
            .and_then(|()| self.tasks.run(id, Some(level), Some(priority)));
        if let Err(err) = result {
            let _ = self.tasks.free(id);
            self.mm.free_4k(stack, stack_bytes);
            return Err(err.into());
        }
        Ok(id)
    }

    /// Registers a queue of `capacity` events backed by region memory.
    ///
    /// Queue buffers take whole pages so they never share one with
    /// unrelated data.
    pub fn create_queue(
        &mut self,
        capacity: usize,
        wake: Option<TaskId>,
    ) -> Result<QueueId, KernelError> {
        let bytes = capacity * core::mem::size_of::<u32>();
        let addr = self.mm.alloc_4k(bytes)?;
        // SAFETY: `init`'s contract makes the region valid 'static RAM; the
        // allocator never hands out overlapping ranges, and queue storage
        // is permanent, so the slice is exclusive for the program's life.
        let buf = unsafe { core::slice::from_raw_parts_mut(addr as *mut u32, capacity) };
        buf.fill(0);
        Ok(self.queues.create(buf, wake)?)
    }

    /// Rotates the processor to the next runnable task.
    ///
    /// `advance` distinguishes the slice-expiry path (move the round-robin
    /// cursor on) from the immediate path after a sleep (the removal
    /// already moved the rotation). Rearms the slice timer with the
    /// incoming task's priority, and skips the hardware switch entirely
    /// when the same task is selected again.
    fn reschedule(&mut self, advance: bool) {
        let Some(next) = self.tasks.rotate(advance) else {
            // The idle task exists precisely so this cannot happen.
            panic!("no runnable task");
        };

        if let Some(slice_timer) = self.slice_timer {
            let slice = self.tasks.priority(next).max(1);
            if let Err(err) = self.timers.arm(slice_timer, slice) {
                log_error!(target: "kernel", "slice timer rearm failed: {:?}", err);
            }
        }

        let previous = self.tasks.executing();
        if previous == Some(next) {
            return;
        }
        match previous {
            Some(prev) => {
                #[cfg(feature = "debug_uart")]
                {
                    use core::fmt::Write as _;
                    let mut u = crate::uart::raw_writer();
                    let _ = writeln!(u, "SCHED: switch {} -> {}", prev, next);
                }
                let (save, load) = self.tasks.context_pair(prev, next);
                self.tasks.commit_switch(next);
                // SAFETY: both pointers name live, distinct pool slots; the
                // incoming context is either a first-run frame over a stack
                // from the managed region or a state saved right here.
                unsafe { arch::switch(save, load) };
            }
            None => self.tasks.commit_switch(next),
        }
    }

    pub fn mm_mut(&mut self) -> &mut RegionAllocator {
        &mut self.mm
    }

    pub fn mm(&self) -> &RegionAllocator {
        &self.mm
    }

    pub fn timers_mut(&mut self) -> &mut TimerSet {
        &mut self.timers
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub fn queues_mut(&mut self) -> &mut QueueTable {
        &mut self.queues
    }

    pub fn tasks_mut(&mut self) -> &mut TaskSet {
        &mut self.tasks
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

const IDLE_STACK_BYTES: usize = mm::PAGE_SIZE;

fn idle_main() {
    loop {
        arch::wait_for_interrupt();
    }
}
