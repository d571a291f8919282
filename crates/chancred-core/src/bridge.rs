//! Verification callback bridge between the TLS layer and user code.
//!
//! [`verify_peer_callback`] is the function registered with the primitive.
//! It is called synchronously from the handshake thread, hands the user
//! callback to the [`Dispatcher`], and turns every outcome into the TLS
//! layer's integer convention: [`VERIFY_ACCEPT`] only for a callback that
//! returned `Ok(())`, [`VERIFY_REJECT`] for everything else. A rejection,
//! a panic, a missing method, or an unavailable dispatcher all reject the
//! peer. Nothing unwinds past this module.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::dispatch::{Dispatcher, MethodTable};
use crate::primitive::VerifyPeerOptions;
use crate::verify::{VerifyCallback, VerifyRejection, VerifyResult};

/// Returned to the TLS layer when the peer is accepted.
pub const VERIFY_ACCEPT: i32 = 0;

/// Returned to the TLS layer when the peer is rejected.
pub const VERIFY_REJECT: i32 = 1;

/// Userdata carried by the TLS layer alongside [`verify_peer_callback`].
#[derive(Clone)]
pub struct VerifyUserdata {
    callback: VerifyCallback,
    dispatcher: Dispatcher,
}

impl VerifyUserdata {
    pub fn new(callback: VerifyCallback, dispatcher: Dispatcher) -> Self {
        Self {
            callback,
            dispatcher,
        }
    }

    pub fn callback(&self) -> &VerifyCallback {
        &self.callback
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Build the options handed to the primitive at creation time.
    pub fn into_peer_options(self) -> VerifyPeerOptions {
        VerifyPeerOptions {
            verify_peer_callback,
            verify_peer_callback_userdata: Some(self),
        }
    }
}

impl fmt::Debug for VerifyUserdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyUserdata")
            .field("callback", &self.callback)
            .field("dispatcher", &self.dispatcher.name())
            .finish()
    }
}

/// Verify a peer on behalf of the TLS layer.
///
/// Blocks the calling thread until the callback has run on the dispatcher.
pub fn verify_peer_callback(
    server_name: Option<&str>,
    cert: Option<&str>,
    userdata: Option<&VerifyUserdata>,
) -> i32 {
    let Some(userdata) = userdata else {
        warn!("verify peer callback invoked without a callback; rejecting peer");
        return VERIFY_REJECT;
    };

    let callback = userdata.callback.clone();
    let methods = userdata.dispatcher.methods().clone();
    let server_name_owned = server_name.map(str::to_owned);
    let cert_owned = cert.map(str::to_owned);

    let outcome = userdata.dispatcher.run_blocking(move || {
        invoke_contained(
            &callback,
            &methods,
            server_name_owned.as_deref(),
            cert_owned.as_deref(),
        )
    });

    match outcome {
        Ok(Ok(())) => {
            debug!(server_name = ?server_name, "peer accepted by verify callback");
            VERIFY_ACCEPT
        }
        Ok(Err(rejection)) => {
            debug!(
                server_name = ?server_name,
                reason = %rejection,
                "peer rejected by verify callback"
            );
            VERIFY_REJECT
        }
        Err(e) => {
            warn!(server_name = ?server_name, error = %e, "verify callback could not run");
            VERIFY_REJECT
        }
    }
}

/// Invoke the callback, converting a panic into a rejection.
fn invoke_contained(
    callback: &VerifyCallback,
    methods: &MethodTable,
    server_name: Option<&str>,
    cert: Option<&str>,
) -> VerifyResult {
    panic::catch_unwind(AssertUnwindSafe(|| {
        invoke(callback, methods, server_name, cert)
    }))
    .unwrap_or_else(|payload| {
        Err(VerifyRejection::new(format!(
            "verify callback panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn invoke(
    callback: &VerifyCallback,
    methods: &MethodTable,
    server_name: Option<&str>,
    cert: Option<&str>,
) -> VerifyResult {
    match callback {
        VerifyCallback::Direct(f) => f(server_name, cert),
        VerifyCallback::Named(name) => match methods.get(name) {
            Some(method) => method(server_name, cert),
            None => Err(VerifyRejection::new(format!("undefined method `{name}`"))),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn userdata(callback: VerifyCallback) -> (Dispatcher, VerifyUserdata) {
        let dispatcher = Dispatcher::spawn("bridge-test").unwrap();
        let userdata = VerifyUserdata::new(callback, dispatcher.clone());
        (dispatcher, userdata)
    }

    #[test]
    fn missing_userdata_fails_closed() {
        assert_eq!(verify_peer_callback(Some("host"), Some("pem"), None), VERIFY_REJECT);
    }

    #[test]
    fn ok_callback_accepts() {
        let (_d, ud) = userdata(VerifyCallback::direct(|_, _| Ok(())));
        assert_eq!(verify_peer_callback(Some("host"), None, Some(&ud)), VERIFY_ACCEPT);
    }

    #[test]
    fn rejecting_callback_rejects() {
        let (_d, ud) = userdata(VerifyCallback::direct(|_, _| {
            Err(VerifyRejection::new("untrusted"))
        }));
        assert_eq!(verify_peer_callback(Some("host"), None, Some(&ud)), VERIFY_REJECT);
    }

    #[test]
    fn panicking_callback_rejects_without_unwinding() {
        let (dispatcher, ud) = userdata(VerifyCallback::direct(|_, _| panic!("callback blew up")));
        assert_eq!(verify_peer_callback(Some("host"), None, Some(&ud)), VERIFY_REJECT);

        // The worker is still usable afterwards.
        assert_eq!(dispatcher.run_blocking(|| 3).unwrap(), 3);
    }

    #[test]
    fn callback_receives_arguments() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let (_d, ud) = userdata(VerifyCallback::direct(move |name, cert| {
            *sink.lock().unwrap() = Some((name.map(str::to_owned), cert.map(str::to_owned)));
            Ok(())
        }));

        verify_peer_callback(Some("example.com"), Some("CERT"), Some(&ud));
        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            Some((Some("example.com".to_owned()), Some("CERT".to_owned())))
        );
    }

    #[test]
    fn absent_arguments_are_passed_as_none() {
        let (_d, ud) = userdata(VerifyCallback::direct(|name, cert| {
            if name.is_none() && cert.is_none() {
                Ok(())
            } else {
                Err(VerifyRejection::new("expected no arguments"))
            }
        }));
        assert_eq!(verify_peer_callback(None, None, Some(&ud)), VERIFY_ACCEPT);
    }

    #[test]
    fn callback_runs_on_dispatcher_thread() {
        let caller = thread::current().id();
        let (_d, ud) = userdata(VerifyCallback::direct(move |_, _| {
            if thread::current().id() == caller {
                Err(VerifyRejection::new("ran on the handshake thread"))
            } else {
                Ok(())
            }
        }));
        assert_eq!(verify_peer_callback(Some("h"), None, Some(&ud)), VERIFY_ACCEPT);
    }

    #[test]
    fn named_callback_dispatches_through_method_table() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (dispatcher, ud) = userdata(VerifyCallback::named("check_host"));
        dispatcher.register_method("check_host", move |name, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            match name {
                Some("good.example") => Ok(()),
                _ => Err(VerifyRejection::new("bad host")),
            }
        });

        assert_eq!(verify_peer_callback(Some("good.example"), None, Some(&ud)), VERIFY_ACCEPT);
        assert_eq!(verify_peer_callback(Some("evil.example"), None, Some(&ud)), VERIFY_REJECT);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_method_rejects() {
        let (_d, ud) = userdata(VerifyCallback::named("missing"));
        assert_eq!(verify_peer_callback(Some("h"), None, Some(&ud)), VERIFY_REJECT);
    }

    #[test]
    fn peer_options_route_through_bridge() {
        let (_d, ud) = userdata(VerifyCallback::direct(|_, _| Ok(())));
        let options = ud.into_peer_options();
        assert_eq!(options.invoke(Some("h"), Some("pem")), VERIFY_ACCEPT);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
