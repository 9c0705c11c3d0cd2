use crate::server::Context;
use accountsd_proto::*;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::broadcast::error::RecvError;

/// Push `Changed` events for one group until the client unsubscribes,
/// disconnects, or the group disappears.
pub async fn handle_sub_mode(
    conn: &mut FrameReader<&mut UnixStream>,
    initial_payload: &[u8],
    ctx: &Context,
) -> anyhow::Result<()> {
    let path = match decode_path_only(initial_payload) {
        Ok(p) => p,
        Err(e) => {
            let resp = encode_error_response(Status::ErrBadPayload, &e.to_string());
            conn.get_mut().write_all(&resp).await?;
            return Ok(());
        }
    };

    let mut rx = match ctx.groups.get(path.as_str()) {
        Some(group) => group.lock().subscribe(),
        None => {
            let resp = encode_error_response(Status::NotFound, &format!("object '{path}' does not exist"));
            conn.get_mut().write_all(&resp).await?;
            return Ok(());
        }
    };

    // Ack OK
    conn.get_mut().write_all(&encode_response(Status::Ok, &[])).await?;

    let push = encode_push_event_payload(&PushEvent {
        event_type: EventType::Changed,
        path: path.clone(),
    })?;
    let push_frame = encode_response(Status::PushEvent, &push);

    loop {
        tokio::select! {
            res = rx.recv() => {
                match res {
                    // lagging still means "something changed"; one push covers it
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        if conn.get_mut().write_all(&push_frame).await.is_err() {
                            break; // client closed
                        }
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!(%path, "group went away, closing subscription");
                        break;
                    }
                }
            }

            res = conn.read_frame() => {
                match res {
                    Ok(Some(frame)) => match Opcode::try_from(frame[4]) {
                        Ok(Opcode::Unsubscribe) => {
                            let _ = conn.get_mut().write_all(&encode_response(Status::Ok, &[])).await;
                            return Ok(());
                        }
                        Ok(Opcode::Ping) => {
                            let _ = conn.get_mut().write_all(&encode_response(Status::Ok, &[])).await;
                        }
                        _ => {
                            let resp = encode_error_response(Status::ErrBadPayload, "only Ping and Unsubscribe in subscription mode");
                            let _ = conn.get_mut().write_all(&resp).await;
                        }
                    },
                    Ok(None) | Err(_) => return Ok(()),
                }
            }
        }
    }
    Ok(())
}
