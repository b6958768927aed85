//! Signed-in user tracking and the navigation bar state.
//!
//! [`SessionBridge`] follows a [`SessionProvider`]: when an identity appears
//! the cart session is established for it, when it disappears the cart is
//! cleared. It also folds the cart streams into a [`NavbarView`].

use std::sync::Arc;

use record_store_core::{Email, Price, Role};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cart::CartStore;
use crate::remote::CartService;

/// Source of the signed-in identity and role.
pub trait SessionProvider: Send + Sync {
    /// Email of the signed-in user, `None` when signed out.
    fn identity(&self) -> watch::Receiver<Option<Email>>;

    fn role(&self) -> watch::Receiver<Option<Role>>;

    fn sign_out(&self);
}

/// Session held in process memory.
#[derive(Debug)]
pub struct LocalSession {
    identity: watch::Sender<Option<Email>>,
    role: watch::Sender<Option<Role>>,
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            identity: watch::Sender::new(None),
            role: watch::Sender::new(None),
        }
    }

    /// Sign in. The role is published before the identity.
    pub fn sign_in(&self, email: Email, role: Role) {
        self.role.send_replace(Some(role));
        self.identity.send_replace(Some(email));
    }

    #[must_use]
    pub fn current(&self) -> Option<Email> {
        self.identity.borrow().clone()
    }
}

impl SessionProvider for LocalSession {
    fn identity(&self) -> watch::Receiver<Option<Email>> {
        self.identity.subscribe()
    }

    fn role(&self) -> watch::Receiver<Option<Role>> {
        self.role.subscribe()
    }

    fn sign_out(&self) {
        self.identity.send_replace(None);
        self.role.send_replace(None);
    }
}

/// State of the navigation bar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavbarView {
    pub email: Option<Email>,
    pub role: Option<Role>,
    pub cart_enabled: bool,
    pub item_count: u32,
    pub total: Price,
}

impl NavbarView {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.is_some_and(Role::is_admin)
    }
}

/// Background task tying the session to the cart store.
pub struct SessionBridge<S> {
    cart: Arc<CartStore<S>>,
    navbar: watch::Receiver<NavbarView>,
    task: Option<JoinHandle<()>>,
}

impl<S: CartService + 'static> SessionBridge<S> {
    /// Start following `session`. Must be called within a Tokio runtime.
    pub fn start(cart: Arc<CartStore<S>>, session: &impl SessionProvider) -> Self {
        let (navbar_tx, navbar) = watch::channel(NavbarView::default());
        let task = tokio::spawn(follow(
            Arc::clone(&cart),
            session.identity(),
            session.role(),
            navbar_tx,
        ));

        Self {
            cart,
            navbar,
            task: Some(task),
        }
    }
}

impl<S> SessionBridge<S> {
    #[must_use]
    pub fn navbar(&self) -> NavbarView {
        self.navbar.borrow().clone()
    }

    /// Stream of navbar states.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NavbarView> {
        self.navbar.clone()
    }

    /// Clear the cart and sign out of `session`.
    pub fn logout(&self, session: &impl SessionProvider) {
        info!("Logging out");
        self.cart.end_session();
        session.sign_out();
    }

    /// Stop following the session. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Session bridge stopped");
        }
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl<S> Drop for SessionBridge<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn follow<S: CartService>(
    cart: Arc<CartStore<S>>,
    mut identity: watch::Receiver<Option<Email>>,
    mut role: watch::Receiver<Option<Role>>,
    navbar: watch::Sender<NavbarView>,
) {
    let mut snapshots = cart.subscribe();
    identity.mark_changed();
    role.mark_changed();
    snapshots.mark_changed();

    loop {
        tokio::select! {
            changed = identity.changed() => {
                if changed.is_err() {
                    break;
                }
                let email = identity.borrow_and_update().clone();
                navbar.send_modify(|view| {
                    view.email.clone_from(&email);
                    if email.is_none() {
                        view.role = None;
                    }
                });
                match email {
                    Some(email) => {
                        if let Err(err) = cart.establish_session(&email).await {
                            warn!(error = %err, "Failed to establish cart session");
                        }
                    }
                    None => cart.end_session(),
                }
            }
            changed = role.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *role.borrow_and_update();
                navbar.send_if_modified(|view| {
                    let modified = view.role != current;
                    view.role = current;
                    modified
                });
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                navbar.send_modify(|view| {
                    view.cart_enabled = snapshot.is_enabled();
                    view.item_count = snapshot.item_count();
                    view.total = snapshot.total();
                });
            }
        }
    }
    debug!("Session source closed, session bridge exiting");
}
