//! TCP server speaking newline-delimited JSON

use crate::catalog::ListingCatalog;
use crate::error::{MarketError, Result};
use crate::negotiation::NegotiationController;
use crate::pricing::{format_short, suggest_price};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use super::message::{Request, Response};

const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Accepts client connections and serves each on its own task
pub struct ApiServer<C> {
    listener: TcpListener,
    controller: Arc<NegotiationController<C>>,
}

impl<C: ListingCatalog> ApiServer<C> {
    /// Bind the listening socket
    pub async fn bind(addr: &str, controller: Arc<NegotiationController<C>>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            controller,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Runs until the task is dropped.
    pub async fn run(self) -> Result<()> {
        tracing::info!("API listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!("New connection from {}", addr);
                    let controller = self.controller.clone();

                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(controller, stream).await {
                            tracing::debug!("Connection {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn serve_connection<C: ListingCatalog>(
    controller: Arc<NegotiationController<C>>,
    stream: TcpStream,
) -> Result<()> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    while let Some(line) = framed.next().await {
        let line = line.map_err(codec_error)?;
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatch(&controller, &line).await;
        let encoded = serde_json::to_string(&response)?;
        framed.send(encoded).await.map_err(codec_error)?;
    }

    Ok(())
}

fn codec_error(e: LinesCodecError) -> MarketError {
    match e {
        LinesCodecError::Io(io) => MarketError::Io(io),
        LinesCodecError::MaxLineLengthExceeded => {
            MarketError::Validation(format!("request exceeds {} bytes", MAX_LINE_LENGTH))
        }
    }
}

/// Decode one request line and run it against the controller
pub async fn dispatch<C: ListingCatalog>(
    controller: &NegotiationController<C>,
    line: &str,
) -> Response {
    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(e) => return Response::failure(&MarketError::Json(e)),
    };

    match handle(controller, request).await {
        Ok(data) => Response::success(data),
        Err(e) => {
            match &e {
                MarketError::InvalidTransition { .. } => tracing::error!("Request failed: {}", e),
                _ => tracing::debug!("Request failed: {}", e),
            }
            Response::failure(&e)
        }
    }
}

async fn handle<C: ListingCatalog>(
    controller: &NegotiationController<C>,
    request: Request,
) -> Result<Value> {
    let data = match request {
        Request::OpenNegotiation {
            caller,
            listing_id,
            price,
            message,
            contact,
        } => {
            let id = controller
                .open_negotiation(caller, listing_id, price, message, contact)
                .await?;
            json!({ "negotiation_id": id })
        }
        Request::PostSellerMessage {
            caller,
            negotiation_id,
            action,
            content,
            price,
        } => {
            let id = controller
                .post_seller_message(caller, negotiation_id, action, content, price)
                .await?;
            json!({ "message_id": id })
        }
        Request::PostBuyerMessage {
            caller,
            negotiation_id,
            price,
            content,
        } => {
            let id = controller
                .post_buyer_message(caller, negotiation_id, price, content)
                .await?;
            json!({ "message_id": id })
        }
        Request::GetNegotiationThread {
            caller,
            negotiation_id,
        } => serde_json::to_value(
            controller
                .get_negotiation_thread(caller, negotiation_id)
                .await?,
        )?,
        Request::GetNegotiation {
            caller,
            negotiation_id,
        } => serde_json::to_value(controller.get_negotiation(caller, negotiation_id).await?)?,
        Request::ListMyNegotiations { caller, role } => {
            serde_json::to_value(controller.list_my_negotiations(caller, role).await)?
        }
        Request::ListForListing { caller, listing_id } => {
            serde_json::to_value(controller.list_for_listing(caller, listing_id).await?)?
        }
        Request::SuggestPrice { attributes } => {
            let price = suggest_price(&attributes);
            json!({ "price": price, "label": format_short(price) })
        }
        Request::ResumeCascades => serde_json::to_value(controller.resume_cascades().await)?,
    };

    Ok(data)
}
