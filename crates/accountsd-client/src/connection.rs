use crate::{ClientError, GroupTransport};
use accountsd_proto::*;
use async_trait::async_trait;
use bytes::BytesMut;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};

const PUSH_QUEUE: usize = 16;
const CALL_QUEUE: usize = 32;

type Response = Result<(Status, BytesMut), ClientError>;

struct Call {
    op: Opcode,
    payload: BytesMut,
    reply: oneshot::Sender<Response>,
}

/// Request/response connection to the daemon.
///
/// One task owns the stream and answers calls in order. A caller that gives
/// up (for instance an aborted fetch) only drops its reply slot; the task
/// still reads that reply off the wire, so the next call gets its own.
/// Each subscription gets its own stream, since a subscribed connection only
/// carries pushes.
pub struct Connection {
    socket_path: PathBuf,
    calls: mpsc::Sender<Call>,
    max_frame: usize,
}

impl Connection {
    /// Connect to the server at the given socket path
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        let max_frame = DEFAULT_MAX_FRAME_BYTES;
        let (tx, rx) = mpsc::channel(CALL_QUEUE);
        tokio::spawn(drive(FrameReader::new(stream, max_frame), rx));
        Ok(Self {
            socket_path: path.as_ref().to_path_buf(),
            calls: tx,
            max_frame,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.call(Opcode::Ping, BytesMut::new()).await.map(|_| ())
    }

    async fn call(&self, op: Opcode, payload: BytesMut) -> Result<BytesMut, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.calls
            .send(Call { op, payload, reply: tx })
            .await
            .map_err(|_| ClientError::Closed)?;
        let (status, body) = rx.await.map_err(|_| ClientError::Closed)??;
        expect_ok(status, body)
    }
}

/// Owns the call stream until the connection is dropped or breaks.
async fn drive(mut io: FrameReader<UnixStream>, mut calls: mpsc::Receiver<Call>) {
    while let Some(call) = calls.recv().await {
        let res = exchange(&mut io, call.op, &call.payload).await;
        let broken = res.is_err();
        if let Err(e) = &res {
            tracing::debug!("connection failed: {}", e);
        }
        // the caller may have gone away; its reply is consumed either way
        let _ = call.reply.send(res);
        if broken {
            break;
        }
    }
}

async fn exchange(io: &mut FrameReader<UnixStream>, op: Opcode, payload: &[u8]) -> Response {
    io.get_mut().write_all(&encode_request(op, payload)).await?;
    read_response(io).await
}

async fn read_response(io: &mut FrameReader<UnixStream>) -> Response {
    let mut frame = io.read_frame().await?.ok_or(ClientError::Closed)?;
    // [u32 len][u8 status][payload]
    let status = Status::from(frame[4]);
    Ok((status, frame.split_off(5)))
}

fn expect_ok(status: Status, body: BytesMut) -> Result<BytesMut, ClientError> {
    if status.is_error() {
        return Err(ClientError::Remote {
            status,
            message: decode_error_message(&body),
        });
    }
    Ok(body)
}

#[async_trait]
impl GroupTransport for Connection {
    async fn get_all(&self, path: &ObjectPath) -> Result<GroupProperties, ClientError> {
        let body = self.call(Opcode::GetAll, encode_path_only(path)?).await?;
        Ok(decode_properties_v1(&body)?)
    }

    async fn set_group_name(&self, path: &ObjectPath, new_name: &str) -> Result<(), ClientError> {
        let payload = encode_path_and_arg(path, new_name)?;
        self.call(Opcode::SetGroupName, payload).await.map(|_| ())
    }

    async fn add_user(&self, path: &ObjectPath, user: &ObjectPath) -> Result<(), ClientError> {
        let payload = encode_path_and_arg(path, user.as_str())?;
        self.call(Opcode::AddUser, payload).await.map(|_| ())
    }

    async fn remove_user(&self, path: &ObjectPath, user: &ObjectPath) -> Result<(), ClientError> {
        let payload = encode_path_and_arg(path, user.as_str())?;
        self.call(Opcode::RemoveUser, payload).await.map(|_| ())
    }

    async fn list_groups(&self) -> Result<Vec<ObjectPath>, ClientError> {
        let body = self.call(Opcode::ListGroups, BytesMut::new()).await?;
        Ok(decode_path_list(&body)?)
    }

    async fn subscribe(&self, path: &ObjectPath) -> Result<mpsc::Receiver<PushEvent>, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        // pushes may follow the ack in the same read; the reader keeps them
        let mut io = FrameReader::new(stream, self.max_frame);
        let (status, body) = exchange(&mut io, Opcode::Subscribe, &encode_path_only(path)?).await?;
        expect_ok(status, body)?;

        let (tx, rx) = mpsc::channel(PUSH_QUEUE);
        let path = path.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = io.read_frame() => {
                        let frame = match res {
                            Ok(Some(f)) => f,
                            Ok(None) => break,
                            Err(e) => {
                                tracing::debug!(%path, "subscription read failed: {}", e);
                                break;
                            }
                        };
                        if Status::from(frame[4]) != Status::PushEvent {
                            continue; // Ping/Unsubscribe acks
                        }
                        match decode_push_event_payload(&frame[5..]) {
                            Ok(ev) => {
                                if tx.send(ev).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::debug!(%path, "bad push event: {}", e),
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });
        Ok(rx)
    }
}
