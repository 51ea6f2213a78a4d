use super::{FocusTracker, WindowId};
use crate::error::Result;

/// Used where the active window cannot be queried; focus is left to the
/// window manager.
#[derive(Debug, Default)]
pub struct NoFocusTracking;

impl FocusTracker for NoFocusTracking {
    fn active_window(&mut self) -> Result<Option<WindowId>> {
        Ok(None)
    }

    fn activate(&mut self, _window: WindowId) -> Result<()> {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub use x11::X11Focus;

#[cfg(target_os = "linux")]
mod x11 {
    use super::{FocusTracker, WindowId};
    use crate::error::{Result, SnipError};
    use x11rb::connection::Connection;
    use x11rb::protocol::xproto::{
        Atom, AtomEnum, ClientMessageData, ClientMessageEvent, ConfigureWindowAux,
        ConnectionExt, EventMask, StackMode, Window, CLIENT_MESSAGE_EVENT,
    };
    use x11rb::rust_connection::RustConnection;

    /// Source indication in `_NET_ACTIVE_WINDOW` requests: 2 = pager, which
    /// window managers honour without focus-stealing prevention.
    const SOURCE_PAGER: u32 = 2;

    fn x11_err(e: impl std::fmt::Display) -> SnipError {
        SnipError::Focus(e.to_string())
    }

    /// EWMH focus tracking through `_NET_ACTIVE_WINDOW`.
    pub struct X11Focus {
        conn: RustConnection,
        root: Window,
        net_active_window: Atom,
    }

    impl X11Focus {
        pub fn connect() -> Result<Self> {
            let (conn, screen_num) = x11rb::connect(None).map_err(x11_err)?;
            let root = conn.setup().roots[screen_num].root;
            let net_active_window = conn
                .intern_atom(false, b"_NET_ACTIVE_WINDOW")
                .map_err(x11_err)?
                .reply()
                .map_err(x11_err)?
                .atom;
            Ok(Self {
                conn,
                root,
                net_active_window,
            })
        }
    }

    impl FocusTracker for X11Focus {
        fn active_window(&mut self) -> Result<Option<WindowId>> {
            let prop = self
                .conn
                .get_property(false, self.root, self.net_active_window, AtomEnum::WINDOW, 0, 1)
                .map_err(x11_err)?
                .reply()
                .map_err(x11_err)?;

            let window = prop.value32().and_then(|mut values| values.next());
            Ok(window.filter(|&w| w != 0).map(|w| WindowId(u64::from(w))))
        }

        fn activate(&mut self, window: WindowId) -> Result<()> {
            let window = Window::try_from(window.0)
                .map_err(|_| SnipError::Focus(format!("window id {} out of range", window.0)))?;

            self.conn
                .configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))
                .map_err(x11_err)?;

            let event = ClientMessageEvent {
                response_type: CLIENT_MESSAGE_EVENT,
                format: 32,
                sequence: 0,
                window,
                type_: self.net_active_window,
                data: ClientMessageData::from([SOURCE_PAGER, x11rb::CURRENT_TIME, 0, 0, 0]),
            };
            self.conn
                .send_event(
                    false,
                    self.root,
                    EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                    &event,
                )
                .map_err(x11_err)?;
            self.conn.flush().map_err(x11_err)?;
            Ok(())
        }
    }
}
