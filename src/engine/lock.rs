// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{fmt, panic::Location};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

/// The coarse engine lock.
///
/// Control threads hold it while they change the engine; the audio thread only
/// ever tries it. The lock is reentrant so control code can call other locking
/// engine methods. Every acquisition records its call site, and `holder`
/// reports the innermost one.
pub struct EngineLock {
    mutex: ReentrantMutex<()>,
    holder: Mutex<Option<&'static Location<'static>>>,
}

impl Default for EngineLock {
    fn default() -> Self {
        EngineLock::new()
    }
}

impl EngineLock {
    pub fn new() -> EngineLock {
        EngineLock {
            mutex: ReentrantMutex::new(()),
            holder: Mutex::new(None),
        }
    }

    /// Blocks until the lock is acquired.
    #[track_caller]
    pub fn lock(&self) -> EngineGuard<'_> {
        let guard = self.mutex.lock();
        self.held(guard, Location::caller())
    }

    /// Acquires the lock only if nobody else holds it.
    #[track_caller]
    pub fn try_lock(&self) -> Option<EngineGuard<'_>> {
        let guard = self.mutex.try_lock()?;
        Some(self.held(guard, Location::caller()))
    }

    /// Where the lock was last acquired, if it is held.
    pub fn holder(&self) -> Option<&'static Location<'static>> {
        *self.holder.lock()
    }

    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }

    fn held<'a>(
        &'a self,
        guard: ReentrantMutexGuard<'a, ()>,
        location: &'static Location<'static>,
    ) -> EngineGuard<'a> {
        let previous = self.holder.lock().replace(location);
        EngineGuard {
            lock: self,
            previous,
            _guard: guard,
        }
    }
}

impl fmt::Debug for EngineLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLock")
            .field("holder", &self.holder())
            .finish()
    }
}

/// Holds the engine lock until dropped.
pub struct EngineGuard<'a> {
    lock: &'a EngineLock,
    previous: Option<&'static Location<'static>>,
    _guard: ReentrantMutexGuard<'a, ()>,
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        // Runs before the mutex guard field is released.
        *self.lock.holder.lock() = self.previous;
    }
}
