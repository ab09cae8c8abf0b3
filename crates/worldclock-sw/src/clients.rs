//! Pages the worker can see and message (`clients`).

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use url::Url;

use crate::control::ClientMessage;
use crate::error::{SwError, SwResult};

/// An open window in the worker's scope.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    pub focused: bool,
    /// Whether this worker controls the client.
    pub controlled: bool,
    inbox: Option<mpsc::UnboundedSender<ClientMessage>>,
}

impl Client {
    /// Create a window client and the receiving end of its message queue.
    pub fn window(url: Url) -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self {
            id: next_client_id(),
            url,
            focused: false,
            controlled: false,
            inbox: Some(tx),
        };
        (client, rx)
    }

    /// Post message to client.
    pub fn post_message(&self, message: ClientMessage) -> SwResult<()> {
        let inbox = self
            .inbox
            .as_ref()
            .ok_or_else(|| SwError::InvalidState(format!("client {} has no message port", self.id)))?;
        inbox
            .send(message)
            .map_err(|_| SwError::InvalidState(format!("client {} is closed", self.id)))
    }

    /// Bring the window to the front.
    pub fn focus(&mut self) {
        self.focused = true;
    }
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Number of known clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether there are no clients.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Window clients, in ID order.
    pub fn windows(&self) -> Vec<&Client> {
        let mut windows: Vec<_> = self.clients.values().collect();
        windows.sort_by(|a, b| a.id.cmp(&b.id));
        windows
    }

    /// Take control of every client. Returns how many changed hands.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        debug!(claimed, "Clients claimed");
        claimed
    }

    /// Post to every client, controlled or not. Returns how many received it.
    ///
    /// Closed clients are skipped; they are pruned by the host via `remove`.
    pub fn broadcast(&self, message: &ClientMessage) -> usize {
        self.clients
            .values()
            .filter(|client| match client.post_message(message.clone()) {
                Ok(()) => true,
                Err(e) => {
                    trace!(client = %client.id, error = %e, "Broadcast skipped client");
                    false
                }
            })
            .count()
    }

    /// Focus the first window client. Returns its ID.
    pub fn focus_first_window(&mut self) -> Option<String> {
        let id = self.windows().first().map(|c| c.id.clone())?;
        let client = self.clients.get_mut(&id)?;
        client.focus();
        Some(id)
    }

    /// Open a window. The host receives it through the worker event channel.
    pub fn open_window(&mut self, url: Url) -> Client {
        let client = Client {
            id: next_client_id(),
            url,
            focused: true,
            controlled: true,
            inbox: None,
        };
        self.add(client.clone());
        client
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{:06}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
