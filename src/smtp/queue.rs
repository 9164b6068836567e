use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::context::CoreContext;
use crate::error::{Component, Error, ErrorKind, Result};
use crate::mailstore::{InboundMailData, MailStore};
use crate::utils::dns::lookup_mx_host;
use crate::utils::split_address;

use super::client::SmtpClient;
use super::session::Envelope;
use super::ReceivedMail;

/// Mail bound for a foreign server: relayed through an [`SmtpClient`]
/// instance pointed at the recipient domain's mail exchanger.
#[derive(Debug, Clone)]
pub struct OutboundMailData {
    pub sender: String,
    pub recipient: String,
    pub remote_host: String,
    pub data: Arc<String>,
}

/// Fans accepted envelopes out into per-recipient delivery items: internal
/// recipients are persisted through the mailstore, external ones are relayed
/// over SMTP. Items flow through two channels drained by [`SendQueue::serve`].
pub struct SendQueue {
    hostname: String,
    store: Arc<MailStore>,
    inbound_tx: mpsc::UnboundedSender<InboundMailData>,
    outbound_tx: mpsc::UnboundedSender<OutboundMailData>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<InboundMailData>>,
    outbound_rx: Mutex<mpsc::UnboundedReceiver<OutboundMailData>>,
}

impl SendQueue {
    pub fn new(ctx: &CoreContext, store: Arc<MailStore>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            hostname: ctx.hostname.clone(),
            store,
            inbound_tx,
            outbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    /// Accepts an envelope and returns immediately; a spawned producer task
    /// classifies each recipient and feeds the delivery channels. A
    /// recipient that fails classification is reported and skipped without
    /// affecting its siblings.
    pub fn queue_mail(&self, envelope: Envelope) {
        let inbound_tx = self.inbound_tx.clone();
        let outbound_tx = self.outbound_tx.clone();

        tokio::spawn(async move {
            enum Route {
                Internal,
                External(String),
                Failed,
            }

            let mut routes = Vec::with_capacity(envelope.recipients.len());
            for recipient in &envelope.recipients {
                if envelope.is_internal(recipient) {
                    routes.push(Route::Internal);
                    continue;
                }

                let (_, host) = split_address(recipient);
                match lookup_mx_host(host).await {
                    Ok(remote) => routes.push(Route::External(remote)),
                    Err(e) => {
                        Self::handle_delivery_error(&envelope.sender, &e);
                        routes.push(Route::Failed);
                    }
                }
            }

            let data = Arc::new(envelope.data);
            for (recipient, route) in envelope.recipients.into_iter().zip(routes) {
                match route {
                    Route::Internal => {
                        let _ = inbound_tx.send(InboundMailData {
                            recipient,
                            real_sender: envelope.sender.clone(),
                            data: Arc::clone(&data),
                        });
                    }
                    Route::External(remote_host) => {
                        let _ = outbound_tx.send(OutboundMailData {
                            sender: envelope.sender.clone(),
                            recipient,
                            remote_host,
                            data: Arc::clone(&data),
                        });
                    }
                    // Classification already failed and was reported.
                    Route::Failed => {}
                }
            }
        });
    }

    /// Long-running dispatcher. Delivery failures are reported per item and
    /// never stop the loop.
    pub async fn serve(&self) -> Result<()> {
        let mut inbound = self.inbound_rx.lock().await;
        let mut outbound = self.outbound_rx.lock().await;

        info!("send queue worker running");
        loop {
            tokio::select! {
                Some(mail) = inbound.recv() => {
                    debug!("delivering internal mail for {}", mail.recipient);
                    if let Err(e) = self.store.save(&mail).await {
                        Self::handle_delivery_error(&mail.real_sender, &e);
                    }
                }
                Some(mail) = outbound.recv() => {
                    debug!(
                        "relaying mail for {} via {}",
                        mail.recipient, mail.remote_host
                    );
                    if let Err(e) = self.send_external_mail(&mail).await {
                        Self::handle_delivery_error(&mail.sender, &e);
                    }
                }
                else => return Ok(()),
            }
        }
    }

    /// Relays one item to its remote exchanger: greet, envelope, payload,
    /// quit.
    pub(crate) async fn send_external_mail(&self, mail: &OutboundMailData) -> Result<()> {
        let comm = |e: Error| {
            Error::new(Component::SendQueue, ErrorKind::CommunicationErrorRemote).with_cause(e)
        };

        let mut client = SmtpClient::connect(&mail.remote_host).await.map_err(|e| {
            Error::new(Component::SendQueue, ErrorKind::CannotConnectToRemote)
                .with_info(format!("Remote host {}", mail.remote_host))
                .with_cause(e)
        })?;

        client.greet(&self.hostname).await.map_err(comm)?;
        client.set_sender(&mail.sender).await.map_err(comm)?;
        client.add_recipient(&mail.recipient).await.map_err(comm)?;
        client.send_data(&mail.data).await.map_err(comm)?;
        client.close().await;

        info!("relayed mail from {} to {}", mail.sender, mail.recipient);
        Ok(())
    }

    /// Records a failed delivery on behalf of the sender.
    // TODO: generate a bounce message back to local senders.
    fn handle_delivery_error(sender: &str, err: &Error) {
        error!("delivery failure for mail from {}: {}", sender, err);
    }
}

impl ReceivedMail for SendQueue {
    fn received(&self, envelope: Envelope) {
        self.queue_mail(envelope);
    }
}
