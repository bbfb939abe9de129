//! NDI runtime lifetime.
//!
//! `NDIlib_initialize` / `NDIlib_destroy` are process-global. Every [`NDI`]
//! handle holds one reference; the runtime is torn down when the last handle
//! goes away, including the clones held by receivers running on worker threads.

use std::{
    ffi::CStr,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use log::{debug, error};
use once_cell::sync::Lazy;

use crate::{ndi_lib::*, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    /// Another thread is inside `NDIlib_initialize`.
    Initializing,
    Initialized { refcount: usize },
    /// Another thread is inside `NDIlib_destroy`.
    Destroying,
}

struct RuntimeManager {
    state: Mutex<State>,
    cv: Condvar,
}

impl RuntimeManager {
    const fn new() -> Self {
        Self {
            state: Mutex::new(State::Uninitialized),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) -> Result<()> {
        let mut state = self.lock();

        loop {
            match *state {
                State::Uninitialized => {
                    *state = State::Initializing;
                    drop(state);

                    // The FFI call runs without the lock held.
                    let initialized = unsafe { NDIlib_initialize() };

                    state = self.lock();
                    *state = if initialized {
                        State::Initialized { refcount: 1 }
                    } else {
                        State::Uninitialized
                    };
                    self.cv.notify_all();

                    return if initialized {
                        debug!("NDI runtime initialized");
                        Ok(())
                    } else {
                        Err(Error::InitializationFailed(
                            "NDIlib_initialize failed".into(),
                        ))
                    };
                }
                State::Initializing | State::Destroying => {
                    state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                State::Initialized { refcount } => {
                    *state = State::Initialized {
                        refcount: refcount + 1,
                    };
                    return Ok(());
                }
            }
        }
    }

    fn release(&self) {
        let mut state = self.lock();

        match *state {
            State::Initialized { refcount: 1 } => {
                *state = State::Destroying;
                drop(state);

                unsafe { NDIlib_destroy() };

                let mut state = self.lock();
                *state = State::Uninitialized;
                self.cv.notify_all();
                debug!("NDI runtime destroyed");
            }
            State::Initialized { refcount } => {
                *state = State::Initialized {
                    refcount: refcount - 1,
                };
            }
            other => {
                error!("NDI runtime released in state {:?}", other);
                debug_assert!(false, "release() called in invalid state: {:?}", other);
            }
        }
    }
}

static RUNTIME: Lazy<RuntimeManager> = Lazy::new(RuntimeManager::new);

/// A reference to the NDI runtime.
///
/// Create one before any other NDI call. Handles from [`NDI::new`] and
/// [`NDI::try_clone`] share the same runtime; it is destroyed when the last
/// handle is dropped.
///
/// ```no_run
/// # fn main() -> Result<(), ndi_viewer::Error> {
/// let ndi = ndi_viewer::NDI::new()?;
/// println!("NDI {}", ndi_viewer::NDI::version()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct NDI(());

impl NDI {
    /// Acquires a reference to the runtime, initializing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitializationFailed`] if the SDK fails to initialize.
    pub fn new() -> Result<Self> {
        RUNTIME.acquire()?;
        Ok(Self(()))
    }

    /// Checks if the current CPU is supported by the NDI SDK.
    pub fn is_supported_cpu() -> bool {
        unsafe { NDIlib_is_supported_CPU() }
    }

    /// Returns the version string of the NDI runtime.
    pub fn version() -> Result<String> {
        let version_ptr = unsafe { NDIlib_version() };
        if version_ptr.is_null() {
            return Err(Error::NullPointer("NDIlib_version".into()));
        }
        unsafe { CStr::from_ptr(version_ptr) }
            .to_str()
            .map(str::to_owned)
            .map_err(|e| Error::InvalidUtf8(e.to_string()))
    }

    /// Takes another reference to the runtime.
    ///
    /// Unlike `Clone`, this reports a failure instead of panicking.
    pub fn try_clone(&self) -> Result<Self> {
        Self::new()
    }
}

impl Drop for NDI {
    fn drop(&mut self) {
        RUNTIME.release();
    }
}
