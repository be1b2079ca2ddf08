use crate::Error;
use crate::mode::Assertion;
use objc2_core_foundation::CFString;
use objc2_io_kit::{
    IOPMAssertionCreateWithName, IOPMAssertionID, IOPMAssertionRelease, kIOPMAssertionLevelOn,
    kIOReturnSuccess,
};

const ASSERTION_TYPE_NO_IDLE_SLEEP: &str = "PreventUserIdleSystemSleep";
const ASSERTION_TYPE_NO_DISPLAY_SLEEP: &str = "PreventUserIdleDisplaySleep";
const ASSERTION_NAME: &str = "CaffeineTake is keeping the computer awake";

/// Held IOKit assertions, one per suppressed timer.
pub struct Inner {
    system: Option<IOPMAssertionID>,
    display: Option<IOPMAssertionID>,
}

impl Inner {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            system: None,
            display: None,
        })
    }
}

pub fn is_supported() -> bool {
    true
}

pub fn apply(inner: &mut Inner, assertion: Assertion) -> Result<(), Error> {
    reconcile(
        &mut inner.system,
        assertion.system_required(),
        ASSERTION_TYPE_NO_IDLE_SLEEP,
    )?;
    reconcile(
        &mut inner.display,
        assertion.display_required(),
        ASSERTION_TYPE_NO_DISPLAY_SLEEP,
    )
}

fn reconcile(
    slot: &mut Option<IOPMAssertionID>,
    wanted: bool,
    assertion_type: &'static str,
) -> Result<(), Error> {
    match (*slot, wanted) {
        (None, true) => {
            *slot = Some(create(assertion_type)?);
        }
        (Some(id), false) => {
            release(id, assertion_type)?;
            *slot = None;
        }
        _ => {}
    }
    Ok(())
}

fn create(assertion_type: &'static str) -> Result<IOPMAssertionID, Error> {
    let assertion_type_cf = CFString::from_static_str(assertion_type);
    let assertion_name = CFString::from_static_str(ASSERTION_NAME);

    let mut id: IOPMAssertionID = 0;
    let rc = unsafe {
        IOPMAssertionCreateWithName(
            Some(&assertion_type_cf),
            kIOPMAssertionLevelOn,
            Some(&assertion_name),
            &mut id as *mut IOPMAssertionID,
        )
    };

    if rc != kIOReturnSuccess {
        return Err(Error::Os(format!(
            "IOPMAssertionCreateWithName({assertion_type}) failed (IOReturn={rc})"
        )));
    }

    tracing::debug!(assertion_type, id, "created power assertion");
    Ok(id)
}

fn release(id: IOPMAssertionID, assertion_type: &'static str) -> Result<(), Error> {
    let rc = IOPMAssertionRelease(id);
    if rc != kIOReturnSuccess {
        return Err(Error::Os(format!(
            "IOPMAssertionRelease({assertion_type}) failed (IOReturn={rc})"
        )));
    }
    tracing::debug!(assertion_type, id, "released power assertion");
    Ok(())
}
