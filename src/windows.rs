use crate::Error;
use crate::mode::Assertion;
use windows::Win32::System::Power::{
    ES_CONTINUOUS, ES_DISPLAY_REQUIRED, ES_SYSTEM_REQUIRED, EXECUTION_STATE,
    SetThreadExecutionState,
};

pub struct Inner {
    last_flags: EXECUTION_STATE,
}

impl Inner {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            last_flags: ES_CONTINUOUS,
        })
    }
}

pub fn is_supported() -> bool {
    true
}

fn flags_for(assertion: Assertion) -> EXECUTION_STATE {
    let mut flags = ES_CONTINUOUS;
    if assertion.system_required() {
        flags = flags | ES_SYSTEM_REQUIRED;
    }
    if assertion.display_required() {
        flags = flags | ES_DISPLAY_REQUIRED;
    }
    flags
}

pub fn apply(inner: &mut Inner, assertion: Assertion) -> Result<(), Error> {
    let flags = flags_for(assertion);

    // SAFETY: No preconditions.
    let previous = unsafe { SetThreadExecutionState(flags) };
    if previous == EXECUTION_STATE(0) {
        return Err(Error::Os(format!(
            "SetThreadExecutionState({:#x}) failed: {}",
            flags.0,
            std::io::Error::last_os_error()
        )));
    }

    tracing::debug!(
        flags = flags.0,
        previous = inner.last_flags.0,
        "set thread execution state"
    );
    inner.last_flags = flags;
    Ok(())
}
