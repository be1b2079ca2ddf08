use crate::Error;
use crate::mode::Assertion;
use std::collections::BTreeMap;
use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::{OwnedFd, OwnedObjectPath, OwnedValue, Str};

const APPLICATION_ID: &str = "caffeine_take";
const REASON: &str = "CaffeineTake is keeping the computer awake";

const GNOME_INHIBIT_IDLE: u32 = 8;
const PORTAL_INHIBIT_IDLE: u32 = 8;

enum DisplayBackend {
    // Session bus APIs (cookie + same connection must remain alive)
    GnomeSession { conn: Connection, cookie: u32 },
    FdoScreenSaver { conn: Connection, cookie: u32 },
    FdoPowerManagement { conn: Connection, cookie: u32 },
    XdgPortal { conn: Connection, handle: OwnedObjectPath },
}

/// Keeps the session from going idle, which keeps the display on.
struct DisplayInhibitor {
    backend: DisplayBackend,
}

impl DisplayInhibitor {
    fn acquire() -> Result<Self, Error> {
        let conn = Connection::session().map_err(|e| Error::Dbus(e.to_string()))?;

        let backend = if let Ok(cookie) = try_gnome_session(&conn) {
            DisplayBackend::GnomeSession { conn, cookie }
        } else if let Ok(cookie) = try_fdo_screensaver(&conn) {
            DisplayBackend::FdoScreenSaver { conn, cookie }
        } else if let Ok(cookie) = try_fdo_powermanagement(&conn) {
            DisplayBackend::FdoPowerManagement { conn, cookie }
        } else if let Ok(handle) = try_xdg_portal(&conn) {
            DisplayBackend::XdgPortal { conn, handle }
        } else {
            return Err(Error::Unsupported(
                "no session-bus idle inhibition service found".to_string(),
            ));
        };

        Ok(Self { backend })
    }

    fn release(&self) -> Result<(), Error> {
        let (conn, destination, path, interface, method, cookie) = match &self.backend {
            DisplayBackend::GnomeSession { conn, cookie } => (
                conn,
                "org.gnome.SessionManager",
                "/org/gnome/SessionManager",
                "org.gnome.SessionManager",
                "Uninhibit",
                *cookie,
            ),
            DisplayBackend::FdoScreenSaver { conn, cookie } => (
                conn,
                "org.freedesktop.ScreenSaver",
                "/org/freedesktop/ScreenSaver",
                "org.freedesktop.ScreenSaver",
                "UnInhibit",
                *cookie,
            ),
            DisplayBackend::FdoPowerManagement { conn, cookie } => (
                conn,
                "org.freedesktop.PowerManagement",
                "/org/freedesktop/PowerManagement/Inhibit",
                "org.freedesktop.PowerManagement.Inhibit",
                "UnInhibit",
                *cookie,
            ),
            DisplayBackend::XdgPortal { conn, handle } => {
                // Released by closing the request object the portal handed back.
                let proxy = Proxy::new(
                    conn,
                    "org.freedesktop.portal.Desktop",
                    handle.clone(),
                    "org.freedesktop.portal.Request",
                )
                .map_err(|e| Error::Dbus(e.to_string()))?;
                let _: () = proxy
                    .call("Close", &())
                    .map_err(|e| Error::Dbus(e.to_string()))?;
                return Ok(());
            }
        };

        let proxy = Proxy::new(conn, destination, path, interface)
            .map_err(|e| Error::Dbus(e.to_string()))?;
        let _: () = proxy
            .call(method, &(cookie))
            .map_err(|e| Error::Dbus(e.to_string()))?;
        Ok(())
    }
}

/// systemd-logind idle inhibitor; held for as long as the fd stays open.
struct SystemInhibitor {
    _conn: Connection,
    _fd: OwnedFd,
}

impl SystemInhibitor {
    fn acquire() -> Result<Self, Error> {
        let (conn, fd) = try_logind().map_err(|e| Error::Dbus(e.to_string()))?;
        Ok(Self {
            _conn: conn,
            _fd: fd,
        })
    }
}

pub struct Inner {
    system: Option<SystemInhibitor>,
    display: Option<DisplayInhibitor>,
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
    Connection::system().is_ok()
}

pub fn apply(inner: &mut Inner, assertion: Assertion) -> Result<(), Error> {
    if assertion.system_required() {
        if inner.system.is_none() {
            inner.system = Some(SystemInhibitor::acquire()?);
            tracing::debug!("acquired logind idle inhibitor");
        }
    } else if inner.system.take().is_some() {
        // Dropping the fd releases the inhibitor.
        tracing::debug!("released logind idle inhibitor");
    }

    if assertion.display_required() {
        if inner.display.is_none() {
            inner.display = Some(DisplayInhibitor::acquire()?);
            tracing::debug!("acquired session idle inhibitor");
        }
    } else if release_held(&mut inner.display, DisplayInhibitor::release)? {
        tracing::debug!("released session idle inhibitor");
    }

    Ok(())
}

/// Releases the held inhibitor, keeping it in `slot` if the release fails.
fn release_held<T>(
    slot: &mut Option<T>,
    release: impl FnOnce(&T) -> Result<(), Error>,
) -> Result<bool, Error> {
    let Some(held) = slot.as_ref() else {
        return Ok(false);
    };
    release(held)?;
    *slot = None;
    Ok(true)
}

fn try_gnome_session(conn: &Connection) -> zbus::Result<u32> {
    let proxy = Proxy::new(
        conn,
        "org.gnome.SessionManager",
        "/org/gnome/SessionManager",
        "org.gnome.SessionManager",
    )?;
    let cookie: u32 = proxy.call(
        "Inhibit",
        &(APPLICATION_ID, 0u32, REASON, GNOME_INHIBIT_IDLE),
    )?;
    Ok(cookie)
}

fn try_fdo_screensaver(conn: &Connection) -> zbus::Result<u32> {
    let proxy = Proxy::new(
        conn,
        "org.freedesktop.ScreenSaver",
        "/org/freedesktop/ScreenSaver",
        "org.freedesktop.ScreenSaver",
    )?;
    let cookie: u32 = proxy.call("Inhibit", &(APPLICATION_ID, REASON))?;
    Ok(cookie)
}

fn try_fdo_powermanagement(conn: &Connection) -> zbus::Result<u32> {
    let proxy = Proxy::new(
        conn,
        "org.freedesktop.PowerManagement",
        "/org/freedesktop/PowerManagement/Inhibit",
        "org.freedesktop.PowerManagement.Inhibit",
    )?;
    let cookie: u32 = proxy.call("Inhibit", &(APPLICATION_ID, REASON))?;
    Ok(cookie)
}

fn try_xdg_portal(conn: &Connection) -> zbus::Result<OwnedObjectPath> {
    let proxy = Proxy::new(
        conn,
        "org.freedesktop.portal.Desktop",
        "/org/freedesktop/portal/desktop",
        "org.freedesktop.portal.Inhibit",
    )?;

    let mut options: BTreeMap<String, OwnedValue> = BTreeMap::new();
    options.insert("reason".to_string(), OwnedValue::from(Str::from(REASON)));

    // flags: 8 = Idle
    let handle: OwnedObjectPath = proxy.call("Inhibit", &("", PORTAL_INHIBIT_IDLE, options))?;
    Ok(handle)
}

fn try_logind() -> zbus::Result<(Connection, OwnedFd)> {
    let conn = Connection::system()?;
    let proxy = Proxy::new(
        &conn,
        "org.freedesktop.login1",
        "/org/freedesktop/login1",
        "org.freedesktop.login1.Manager",
    )?;

    // what: "idle" (inhibit idle actions), mode: "block".
    let fd: OwnedFd = proxy.call("Inhibit", &("idle", APPLICATION_ID, REASON, "block"))?;
    Ok((conn, fd))
}
