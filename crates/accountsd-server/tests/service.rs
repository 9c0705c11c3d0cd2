//! Daemon and client talking over a real socket, with the system databases
//! replaced by files in a scratch directory.

use accountsd_client::{ClientError, Connection, GroupCache, GroupTransport, ObjectPath};
use accountsd_proto::Status;
use accountsd_server::auth::{AuthError, Authority};
use accountsd_server::metrics::Metrics;
use accountsd_server::mutation::{ToolError, ToolRunner};
use accountsd_server::sys::peer::Subject;
use accountsd_server::{serve, Config, Context};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::time::timeout;

const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/sh
alice:x:1:1::/home/alice:/bin/sh
bob:x:2:2::/home/bob:/bin/sh
carol:x:3:3::/home/carol:/bin/sh
";

const GROUP: &str = "\
root:x:0:
staff:x:100:bob,alice,ghost
";

struct Verdict(bool);

#[async_trait]
impl Authority for Verdict {
    async fn check(&self, _: &Subject, action_id: &str, _: bool) -> Result<(), AuthError> {
        if self.0 {
            Ok(())
        } else {
            Err(AuthError::NotAuthorized(action_id.to_string()))
        }
    }
}

#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<Vec<String>>>,
    fail: bool,
}

impl ToolRunner for RecordingRunner {
    fn run(&self, argv: &[String], _: &Subject) -> Result<(), ToolError> {
        self.calls.lock().push(argv.to_vec());
        if self.fail {
            return Err(ToolError {
                tool: argv[0].clone(),
                message: "exited with status 10".into(),
            });
        }
        Ok(())
    }
}

struct Fixture {
    dir: PathBuf,
    ctx: Arc<Context>,
    runner: Arc<RecordingRunner>,
    cache: GroupCache,
}

impl Fixture {
    async fn start(granted: bool, runner: RecordingRunner) -> Self {
        let dir = std::env::temp_dir().join(format!("accountsd-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("passwd"), PASSWD).unwrap();
        std::fs::write(dir.join("group"), GROUP).unwrap();

        let path_str = |name: &str| dir.join(name).to_string_lossy().to_string();
        let cfg = Config {
            socket_path: path_str("accountsd.sock"),
            pid_path: path_str("accountsd.pid"),
            group_file: path_str("group"),
            passwd_file: path_str("passwd"),
            ..Config::default()
        };

        let runner = Arc::new(runner);
        let ctx = Arc::new(Context::new(cfg, Arc::new(Verdict(granted)), runner.clone()));
        ctx.rescan().unwrap();

        let listener = UnixListener::bind(&ctx.cfg.socket_path).unwrap();
        tokio::spawn(serve(listener, ctx.clone()));

        let conn = Connection::connect(&ctx.cfg.socket_path).await.unwrap();
        conn.ping().await.unwrap();
        Self {
            dir,
            ctx,
            runner,
            cache: GroupCache::new(Arc::new(conn)),
        }
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.runner.calls.lock().clone()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn remote_status(res: Result<(), ClientError>) -> Status {
    match res {
        Err(ClientError::Remote { status, .. }) => status,
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_group_members_resolve_and_sort() {
    let f = Fixture::start(true, RecordingRunner::default()).await;

    let staff = f.cache.group_by_name("staff").await.unwrap();
    assert!(!staff.is_nonexistent());
    assert_eq!(staff.gid(), Some(100));
    assert!(staff.local_group());
    assert_eq!(staff.object_path(), Some(ObjectPath::for_group(100)));
    // ghost has no passwd entry
    assert_eq!(staff.users(), vec![ObjectPath::for_user(1), ObjectPath::for_user(2)]);

    let all = f.cache.list_groups().await.unwrap();
    assert_eq!(all.len(), 2);

    assert!(f.cache.group_by_name("wheel").await.unwrap().is_nonexistent());
}

#[tokio::test]
async fn test_denied_rename_runs_nothing() {
    let f = Fixture::start(false, RecordingRunner::default()).await;
    let staff = f.cache.group_by_name("staff").await.unwrap();

    let status = remote_status(staff.try_set_group_name("crew").await);
    assert_eq!(status, Status::ErrDenied);
    // legacy variant swallows the same failure
    staff.set_group_name("crew").await;

    assert!(f.calls().is_empty());
    assert_eq!(Metrics::get(&f.ctx.metrics.denials_total), 2);
}

#[tokio::test]
async fn test_granted_mutations_invoke_tools() {
    let f = Fixture::start(true, RecordingRunner::default()).await;
    let staff = f.cache.group_by_name("staff").await.unwrap();

    staff.try_set_group_name("crew").await.unwrap();
    staff.try_add_user(&ObjectPath::for_user(3)).await.unwrap();
    staff.try_remove_user(&ObjectPath::for_user(1)).await.unwrap();

    assert_eq!(
        f.calls(),
        vec![
            argv(&["/usr/sbin/groupmod", "-n", "crew", "--", "staff"]),
            argv(&["/usr/sbin/groupmems", "-g", "staff", "-a", "carol"]),
            argv(&["/usr/sbin/groupmems", "-g", "staff", "-d", "alice"]),
        ]
    );
    // nothing changes until the database is rescanned
    assert_eq!(staff.group_name().as_deref(), Some("staff"));
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let f = Fixture::start(true, RecordingRunner::default()).await;
    let staff = f.cache.group_by_name("staff").await.unwrap();

    let status = remote_status(staff.try_add_user(&ObjectPath::for_user(999)).await);
    assert_eq!(status, Status::NotFound);
    assert!(f.calls().is_empty());
}

#[tokio::test]
async fn test_tool_failure_is_reported() {
    let runner = RecordingRunner {
        fail: true,
        ..Default::default()
    };
    let f = Fixture::start(true, runner).await;
    let staff = f.cache.group_by_name("staff").await.unwrap();

    match staff.try_set_group_name("crew").await {
        Err(ClientError::Remote { status, message }) => {
            assert_eq!(status, Status::ErrFailed);
            assert!(message.contains("exited with status 10"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(f.calls().len(), 1);
}

#[tokio::test]
async fn test_rescan_pushes_change_to_proxy() {
    let f = Fixture::start(true, RecordingRunner::default()).await;
    let staff = f.cache.group_by_name("staff").await.unwrap();
    let mut events = staff.subscribe();

    std::fs::write(&f.ctx.cfg.group_file, "root:x:0:\nstaff:x:100:bob,alice,carol\n").unwrap();
    let report = f.ctx.rescan().unwrap();
    assert_eq!(report.updated, 1);

    let want = vec![
        ObjectPath::for_user(1),
        ObjectPath::for_user(2),
        ObjectPath::for_user(3),
    ];
    timeout(Duration::from_secs(5), async {
        while staff.users() != want {
            events.recv().await.unwrap();
        }
    })
    .await
    .expect("proxy never saw the new member");
}

#[tokio::test]
async fn test_unchanged_rescan_pushes_nothing() {
    let f = Fixture::start(true, RecordingRunner::default()).await;
    let staff = f.cache.group_by_name("staff").await.unwrap();
    let mut events = staff.subscribe();

    let report = f.ctx.rescan().unwrap();
    assert_eq!(report.updated, 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_non_canonical_group_path_is_not_found() {
    let f = Fixture::start(true, RecordingRunner::default()).await;
    let conn = Connection::connect(&f.ctx.cfg.socket_path).await.unwrap();

    let padded = ObjectPath::parse("/org/freedesktop/Accounts/Group0100").unwrap();
    match conn.get_all(&padded).await {
        Err(ClientError::Remote { status, message }) => {
            assert_eq!(status, Status::NotFound);
            assert!(message.contains("Group0100"), "{message}");
        }
        other => panic!("expected not found, got {other:?}"),
    }
    assert_eq!(conn.get_all(&ObjectPath::for_group(100)).await.unwrap().group_name, "staff");
}
