use std::time::{Duration, Instant};

use actix::{
    Actor, ActorContext, AsyncContext, Handler, Message, Recipient, Running, StreamHandler,
};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio::sync::mpsc::{unbounded_channel, Receiver, UnboundedReceiver, UnboundedSender};

use system::{ClientCommand, ConnectionId, Encoding, FailureReason, Frame, ServerEvent};

use crate::connection_tx_storage::ConnectionTx;
use crate::server::ServerTx;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest inbound frame. A `newSubtitles` flush carries a whole episode, well past the
/// 64 KiB codec default.
pub const MAX_FRAME_SIZE: usize = 1 << 20;

#[derive(Debug)]
pub enum ConnectionCommand {
    Connect {
        tx: ConnectionTx,
    },
    /// `graceful` is false when the socket vanished without a close frame; the
    /// connection then keeps its room for the reconnection grace window.
    Disconnect {
        from: ConnectionId,
        graceful: bool,
    },
    Command {
        from: ConnectionId,
        command: ClientCommand,
    },
}

#[derive(Debug)]
pub enum ConnectionEvent {
    /// The socket now speaks for this connection, fresh or resumed.
    Attached { connection_id: ConnectionId },
    Event(ServerEvent),
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ConnectionEvent);

enum ConnectionState {
    Idle,
    Attached(ConnectionId),
}

struct ConnectionActor {
    state: ConnectionState,
    /// Ordered hand-off to the server loop, drained by [`pump_commands`].
    to_server: UnboundedSender<ConnectionCommand>,
    /// Replies follow the encoding of the latest inbound frame.
    encoding: Encoding,
    /// Commands received before the server assigned an id.
    pending: Vec<ClientCommand>,
    last_heartbeat: Instant,
}

impl ConnectionActor {
    fn new(srv_tx: ServerTx) -> Self {
        let (to_server, rx) = unbounded_channel();
        tokio::spawn(pump_commands(rx, srv_tx));
        Self {
            state: ConnectionState::Idle,
            to_server,
            encoding: Encoding::Json,
            pending: Vec::new(),
            last_heartbeat: Instant::now(),
        }
    }

    fn send_to_server(&self, command: ConnectionCommand) {
        if let Err(e) = self.to_server.send(command) {
            log::warn!("server loop is gone, dropping {:?}", e.0);
        }
    }

    fn forward(&mut self, command: ClientCommand) {
        match self.state {
            ConnectionState::Attached(from) => {
                self.send_to_server(ConnectionCommand::Command { from, command })
            }
            ConnectionState::Idle => self.pending.push(command),
        }
    }

    /// Queued behind every command already forwarded, and delivered even after the
    /// actor is gone.
    fn detach(&mut self, graceful: bool) {
        if let ConnectionState::Attached(from) = self.state {
            self.send_to_server(ConnectionCommand::Disconnect { from, graceful });
            self.state = ConnectionState::Idle;
        }
    }

    fn write(&self, event: &ServerEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match Frame::encode(event, self.encoding) {
            Ok(Frame::Text(text)) => ctx.text(text),
            Ok(Frame::Binary(bytes)) => ctx.binary(bytes),
            Err(e) => log::error!("cannot encode {:?}: {}", event, e),
        }
    }

    fn ingress(&mut self, frame: Frame, ctx: &mut ws::WebsocketContext<Self>) {
        self.encoding = frame.encoding();
        match frame.decode::<ClientCommand>() {
            Ok(command) => {
                log::debug!("Ingress {:?}", command);
                self.forward(command);
            }
            Err(e) => {
                log::debug!("Ingress rejected: {}", e);
                self.write(
                    &ServerEvent::Failure {
                        reason: FailureReason::MalformedMessage(e.to_string()),
                    },
                    ctx,
                );
            }
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                log::info!("websocket heartbeat timed out");
                act.detach(false);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        let (tx, rx) = tokio::sync::mpsc::channel::<ConnectionEvent>(32);
        self.send_to_server(ConnectionCommand::Connect { tx });
        tokio::spawn(pump_events(rx, ctx.address().recipient()));
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.detach(false);
        Running::Stop
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => self.last_heartbeat = Instant::now(),
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.ingress(Frame::Text(text.to_string()), ctx);
            }
            Ok(ws::Message::Binary(bin)) => {
                self.last_heartbeat = Instant::now();
                log::debug!("Ingress size: {}", bin.len());
                self.ingress(Frame::Binary(bin.to_vec()), ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                self.detach(true);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => (),
            Err(e) => {
                log::warn!("websocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ConnectionActorMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Self::Result {
        log::debug!("Egress {:?}", msg.0);
        match msg.0 {
            ConnectionEvent::Attached { connection_id } => {
                self.state = ConnectionState::Attached(connection_id);
                self.write(&ServerEvent::Connected { connection_id }, ctx);
                for command in std::mem::take(&mut self.pending) {
                    self.forward(command);
                }
            }
            ConnectionEvent::Event(event) => self.write(&event, ctx),
        }
    }
}

/// Moves server events into the actor mailbox in order, waiting whenever the mailbox is
/// full. Ends when either side goes away.
async fn pump_events(
    mut rx: Receiver<ConnectionEvent>,
    recipient: Recipient<ConnectionActorMessage>,
) {
    log::debug!("connection green thread - started");
    while let Some(msg) = rx.recv().await {
        if let Err(e) = recipient.send(ConnectionActorMessage(msg)).await {
            log::warn!("connection actor unreachable: {}", e);
            break;
        }
    }
    log::debug!("connection green thread - terminated");
}

/// Moves this socket's commands into the server queue in order, waiting whenever the
/// queue is full.
async fn pump_commands(mut rx: UnboundedReceiver<ConnectionCommand>, srv_tx: ServerTx) {
    while let Some(command) = rx.recv().await {
        if let Err(e) = srv_tx.send(command).await {
            log::error!("server unavailable, dropping {:?}", e.0);
            break;
        }
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    srv_tx: web::Data<ServerTx>,
) -> Result<HttpResponse, Error> {
    ws::WsResponseBuilder::new(ConnectionActor::new(srv_tx.get_ref().clone()), &req, stream)
        .frame_size(MAX_FRAME_SIZE)
        .start()
}
