use crate::error::ServiceError;
use crate::group::SharedGroup;
use crate::mutation::PendingMutation;
use crate::server::Context;
use crate::sys::peer::Subject;
use accountsd_proto::*;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

type Reply = Result<BytesMut, ServiceError>;

pub async fn handle_conn(stream: &mut UnixStream, ctx: &Context, subject: Subject) -> anyhow::Result<()> {
    let mut conn = FrameReader::new(stream, ctx.cfg.max_frame_bytes);

    loop {
        let frame = match conn.read_frame().await {
            Ok(Some(f)) => f,
            Ok(None) => return Ok(()), // EOF
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                let resp = encode_error_response(Status::ErrTooLarge, &e.to_string());
                conn.get_mut().write_all(&resp).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        // frame: [u32 len][u8 opcode][payload...]
        let payload = &frame[5..];
        let op = match Opcode::try_from(frame[4]) {
            Ok(op) => op,
            Err(raw) => {
                let resp = encode_error_response(Status::ErrBadPayload, &format!("unknown opcode {raw:#04x}"));
                conn.get_mut().write_all(&resp).await?;
                continue;
            }
        };

        let reply = match op {
            Opcode::GetAll => handle_get_all(payload, ctx),
            Opcode::SetGroupName => handle_set_group_name(payload, ctx, subject).await,
            Opcode::AddUser => handle_add_remove_user(payload, ctx, subject, true).await,
            Opcode::RemoveUser => handle_add_remove_user(payload, ctx, subject, false).await,
            Opcode::Ping | Opcode::Unsubscribe => Ok(BytesMut::new()),
            Opcode::ListGroups => handle_list_groups(ctx),
            Opcode::Subscribe => {
                // the connection becomes a push stream until it closes
                crate::server::conn_sub::handle_sub_mode(&mut conn, payload, ctx).await?;
                return Ok(());
            }
        };
        write_reply(conn.get_mut(), reply).await?;
    }
}

async fn write_reply(s: &mut UnixStream, reply: Reply) -> std::io::Result<()> {
    let resp = match reply {
        Ok(body) => encode_response(Status::Ok, &body),
        Err(e) => {
            tracing::debug!("call failed: {}", e);
            encode_error_response(e.status(), &e.to_string())
        }
    };
    s.write_all(&resp).await
}

fn bad_payload(e: ProtoError) -> ServiceError {
    ServiceError::BadRequest(e.to_string())
}

fn lookup_group(ctx: &Context, path: &ObjectPath) -> Result<SharedGroup, ServiceError> {
    let unknown = || ServiceError::UnknownTarget(path.to_string());
    // only the canonical group grammar can name a record
    path.group_id().ok_or_else(unknown)?;
    ctx.groups.get(path.as_str()).ok_or_else(unknown)
}

fn handle_get_all(payload: &[u8], ctx: &Context) -> Reply {
    let path = decode_path_only(payload).map_err(bad_payload)?;
    let props = lookup_group(ctx, &path)?.lock().properties();
    encode_properties_v1(&props).map_err(bad_payload)
}

fn handle_list_groups(ctx: &Context) -> Reply {
    encode_path_list(&ctx.groups.list_paths()).map_err(bad_payload)
}

async fn handle_set_group_name(payload: &[u8], ctx: &Context, subject: Subject) -> Reply {
    let (path, new_name) = decode_path_and_arg(payload).map_err(bad_payload)?;
    let group = lookup_group(ctx, &path)?;
    let pending = PendingMutation::rename(group, subject, new_name);
    run_mutation(pending, ctx).await
}

async fn handle_add_remove_user(payload: &[u8], ctx: &Context, subject: Subject, add: bool) -> Reply {
    let (path, user_path) = decode_path_and_arg(payload).map_err(bad_payload)?;
    let group = lookup_group(ctx, &path)?;
    let pending = PendingMutation::membership(group, subject, &user_path, add, ctx.users.as_ref())?;
    run_mutation(pending, ctx).await
}

async fn run_mutation(pending: PendingMutation, ctx: &Context) -> Reply {
    ctx.metrics.inc_mutations();
    match pending
        .execute(ctx.authority.as_ref(), ctx.runner.as_ref(), &ctx.cfg.tools)
        .await
    {
        Ok(()) => Ok(BytesMut::new()),
        Err(e) => {
            match e {
                ServiceError::AuthorizationDenied(_) => ctx.metrics.inc_denials(),
                _ => ctx.metrics.inc_mutations_failed(),
            }
            Err(e)
        }
    }
}
