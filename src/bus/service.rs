//! Request/response services.

use std::any::Any;

use tokio::sync::{mpsc, oneshot};

use crate::error::{BridgeError, Result};

/// Pending requests a server can hold before callers wait
pub const SERVICE_QUEUE_SIZE: usize = 8;

/// One request waiting for its answer.
pub struct ServiceCall<Req, Resp> {
    pub request: Req,
    reply: oneshot::Sender<std::result::Result<Resp, String>>,
}

impl<Req, Resp> ServiceCall<Req, Resp> {
    /// Answer the caller. An `Err` reaches the caller as
    /// [`BridgeError::ServiceFailed`] carrying the given reason.
    pub fn respond(self, result: std::result::Result<Resp, String>) {
        // The caller may have given up waiting; nothing to do then.
        let _ = self.reply.send(result);
    }
}

/// Serving half of a service, handed out by [`Bus::advertise`](super::Bus::advertise).
pub struct ServiceServer<Req, Resp> {
    name: String,
    receiver: mpsc::Receiver<ServiceCall<Req, Resp>>,
}

impl<Req, Resp> ServiceServer<Req, Resp> {
    /// Wait for the next request. Returns `None` once no client can reach
    /// the service any more.
    pub async fn next(&mut self) -> Option<ServiceCall<Req, Resp>> {
        self.receiver.recv().await
    }

    /// Resolved service name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Calling half of a service.
pub struct ServiceClient<Req, Resp> {
    name: String,
    sender: mpsc::Sender<ServiceCall<Req, Resp>>,
}

impl<Req, Resp> Clone for ServiceClient<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<Req: Send + 'static, Resp: Send + 'static> ServiceClient<Req, Resp> {
    /// Send a request and wait for the server's answer.
    ///
    /// # Errors
    ///
    /// - `ServiceUnavailable` if the server was dropped before answering
    /// - `ServiceFailed` if the server answered with an error
    pub async fn call(&self, request: Req) -> Result<Resp> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(ServiceCall { request, reply })
            .await
            .map_err(|_| BridgeError::ServiceUnavailable(self.name.clone()))?;

        match response.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(reason)) => Err(BridgeError::ServiceFailed {
                service: self.name.clone(),
                reason,
            }),
            Err(_) => Err(BridgeError::ServiceUnavailable(self.name.clone())),
        }
    }
}

/// Registry entry for one advertised service.
pub(crate) struct ServiceEntry {
    endpoint: Box<dyn Any + Send + Sync>,
    is_closed: fn(&(dyn Any + Send + Sync)) -> bool,
}

impl ServiceEntry {
    pub(crate) fn is_closed(&self) -> bool {
        (self.is_closed)(self.endpoint.as_ref())
    }

    pub(crate) fn client<Req: Send + 'static, Resp: Send + 'static>(
        &self,
        name: &str,
    ) -> Result<ServiceClient<Req, Resp>> {
        let sender = self
            .endpoint
            .downcast_ref::<mpsc::Sender<ServiceCall<Req, Resp>>>()
            .ok_or_else(|| BridgeError::TopicTypeMismatch {
                topic: name.to_string(),
            })?;

        Ok(ServiceClient {
            name: name.to_string(),
            sender: sender.clone(),
        })
    }
}

fn sender_closed<Req, Resp>(endpoint: &(dyn Any + Send + Sync)) -> bool
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    endpoint
        .downcast_ref::<mpsc::Sender<ServiceCall<Req, Resp>>>()
        .map_or(true, |sender| sender.is_closed())
}

/// Create a connected server and registry entry.
pub(crate) fn channel<Req: Send + 'static, Resp: Send + 'static>(
    name: &str,
) -> (ServiceServer<Req, Resp>, ServiceEntry) {
    let (sender, receiver) = mpsc::channel(SERVICE_QUEUE_SIZE);
    let server = ServiceServer {
        name: name.to_string(),
        receiver,
    };
    let entry = ServiceEntry {
        endpoint: Box::new(sender),
        is_closed: sender_closed::<Req, Resp>,
    };
    (server, entry)
}
