//! 偽のGDBを相手にしたセッションのテスト
//!
//! `tokio::io::duplex` の片側をセッションに、もう片側を偽のGDBに渡し、
//! コマンドの受信と応答の送信を台本通りに行います。

use hibari_core::{
    Category, CorrelationOrder, Diagnostic, EventBus, Reply, Session, SessionConfig,
    SessionError, StatusClass, StreamSelection,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{
    duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf,
    WriteHalf,
};

struct FakeGdb {
    commands: Lines<BufReader<ReadHalf<DuplexStream>>>,
    output: WriteHalf<DuplexStream>,
}

impl FakeGdb {
    /// 次に届くコマンドを検査する
    async fn expect(&mut self, command: &str) {
        let line = self.commands.next_line().await.unwrap().unwrap();
        assert_eq!(line, command);
    }

    /// MIの出力行を送る
    async fn emit(&mut self, lines: &[&str]) {
        for line in lines {
            self.output.write_all(line.as_bytes()).await.unwrap();
            self.output.write_all(b"\n").await.unwrap();
        }
        self.output.flush().await.unwrap();
    }

    /// 任意のバイト列を1行として送る
    async fn emit_bytes(&mut self, line: &[u8]) {
        self.output.write_all(line).await.unwrap();
        self.output.write_all(b"\n").await.unwrap();
        self.output.flush().await.unwrap();
    }
}

fn connect(config: SessionConfig) -> (Session, FakeGdb) {
    let (session_side, gdb_side) = duplex(64 * 1024);
    let (reader, writer) = split(session_side);
    let session = Session::with_io(reader, writer, config).unwrap();

    let (commands, output) = split(gdb_side);
    let gdb = FakeGdb {
        commands: BufReader::new(commands).lines(),
        output,
    };
    (session, gdb)
}

#[tokio::test]
async fn test_exec_run_settles_with_stopped() {
    let (session, mut gdb) = connect(SessionConfig::default());

    let (reply, ()) = tokio::join!(session.execute("-exec-run", false), async {
        gdb.expect("-exec-run").await;
        gdb.emit(&["^running", r#"*stopped,reason="breakpoint-hit",bkptno="1""#])
            .await;
    });

    match reply.unwrap() {
        Reply::Status(status) => {
            assert_eq!(status.kind, StatusClass::Stopped);
            assert_eq!(status.fields[0], "breakpoint-hit");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_execute_collect_console_output() {
    let (session, mut gdb) = connect(SessionConfig::default());

    let (result, ()) = tokio::join!(
        session.execute_collect("-data-evaluate-expression x", StreamSelection::console(), false),
        async {
            gdb.expect("-data-evaluate-expression x").await;
            gdb.emit(&[r#"~"1\n""#, r#"~"2\n""#, r#"^done,value="3""#]).await;
        }
    );

    let (reply, collected) = result.unwrap();
    assert_eq!(reply.subtype(), "done");
    assert_eq!(reply.fields(), &["3".to_string()]);
    assert_eq!(collected, vec![vec![r"1\n".to_string()], vec![r"2\n".to_string()]]);

    // 収集は応答と同時に終わっているので、次の収集をすぐ始められる
    let (result, ()) = tokio::join!(session.collect("-gdb-version"), async {
        gdb.expect("-gdb-version").await;
        gdb.emit(&[r#"~"GNU gdb 14.2\n""#, "^done"]).await;
    });
    assert_eq!(result.unwrap().1, vec![vec![r"GNU gdb 14.2\n".to_string()]]);
}

#[tokio::test]
async fn test_collection_conflict_is_immediate() {
    let (session, mut gdb) = connect(SessionConfig::default());

    let first =
        session.execute_collect("-data-evaluate-expression x", StreamSelection::console(), false);
    let (result, ()) = tokio::join!(first, async {
        gdb.expect("-data-evaluate-expression x").await;
        gdb.emit(&[r#"~"before""#]).await;
        assert!(session.is_collecting());

        let err = session
            .execute_collect("-data-evaluate-expression y", StreamSelection::all(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::CollectionConflict));

        gdb.emit(&[r#"~"after""#, r#"^done,value="1""#]).await;
    });

    let (_, collected) = result.unwrap();
    assert_eq!(
        collected,
        vec![vec!["before".to_string()], vec!["after".to_string()]]
    );

    assert!(!session.is_collecting());
    assert_eq!(session.pending_requests(), 0);

    // 失敗した2つ目のコマンドは書き込まれていない
    session.write_raw("marker").await.unwrap();
    gdb.expect("marker").await;
}

#[tokio::test]
async fn test_error_result_rejects_command() {
    let (session, mut gdb) = connect(SessionConfig::default());

    let (reply, ()) = tokio::join!(session.execute("-file-list-exec-source-file", false), async {
        gdb.expect("-file-list-exec-source-file").await;
        gdb.emit(&[r#"^error,msg="No symbol table is loaded.  Use the \"file\" command.""#])
            .await;
    });

    let err = reply.unwrap_err();
    assert!(matches!(err, SessionError::Command(_)));
    assert!(err.to_string().contains("No symbol table is loaded"));
}

#[tokio::test]
async fn test_ready_fires_once() {
    let callback_count = Arc::new(AtomicUsize::new(0));
    let event_count = Arc::new(AtomicUsize::new(0));

    let mut events = EventBus::new();
    let e = Arc::clone(&event_count);
    events.on_ready(move || {
        e.fetch_add(1, Ordering::SeqCst);
    });
    let c = Arc::clone(&callback_count);
    let config = SessionConfig::default().events(events).on_ready(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });

    let (session, mut gdb) = connect(config);
    assert!(!session.is_ready());

    gdb.emit(&[
        r#"=thread-group-added,id="i1""#,
        r#"~"GNU gdb (GDB) 14.2\n""#,
        "(gdb) ",
        "(gdb) ",
        "(gdb) ",
    ])
    .await;
    session.wait_ready().await.unwrap();
    assert!(session.is_ready());

    // 往復を1回挟んで、残りのプロンプトも処理済みにする
    let (reply, ()) = tokio::join!(session.execute("-list-features", false), async {
        gdb.expect("-list-features").await;
        gdb.emit(&["^done", "(gdb) "]).await;
    });
    reply.unwrap();

    assert_eq!(callback_count.load(Ordering::SeqCst), 1);
    assert_eq!(event_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_capture_program_output() {
    let (session, mut gdb) = connect(SessionConfig::default());

    let (reply, ()) = tokio::join!(session.execute("-exec-continue", true), async {
        gdb.expect("-exec-continue").await;
        gdb.emit(&[
            "^running",
            "Hello from the target",
            r#"*stopped,reason="exited-normally""#,
        ])
        .await;
    });

    let reply = reply.unwrap();
    assert_eq!(reply.subtype(), "stopped");
    assert_eq!(
        reply.output(),
        Some(&["Hello from the target".to_string()][..])
    );
}

#[tokio::test]
async fn test_invalid_utf8_output_keeps_session_alive() {
    let (session, mut gdb) = connect(SessionConfig::default());

    let (reply, ()) = tokio::join!(session.execute("-exec-continue", true), async {
        gdb.expect("-exec-continue").await;
        gdb.emit(&["^running"]).await;
        gdb.emit_bytes(b"caf\xe9").await;
        gdb.emit(&[r#"*stopped,reason="exited-normally""#]).await;
    });

    let reply = reply.unwrap();
    assert_eq!(reply.subtype(), "stopped");
    assert_eq!(reply.output(), Some(&["caf\u{FFFD}".to_string()][..]));

    // 後続のコマンドも通常通り完了する
    let (reply, ()) = tokio::join!(session.execute("-list-features", false), async {
        gdb.expect("-list-features").await;
        gdb.emit(&["^done"]).await;
    });
    assert_eq!(reply.unwrap().subtype(), "done");
}

#[tokio::test]
async fn test_output_closed_before_prompt() {
    let (session, gdb) = connect(SessionConfig::default());
    drop(gdb);

    assert!(matches!(
        session.wait_ready().await,
        Err(SessionError::Abandoned)
    ));
    assert!(!session.is_ready());
    assert!(matches!(
        session.execute("-gdb-version", false).await,
        Err(SessionError::Abandoned)
    ));
}

#[tokio::test]
async fn test_pending_request_abandoned_when_output_closes() {
    let (session, mut gdb) = connect(SessionConfig::default());

    let (reply, ()) = tokio::join!(session.execute("-exec-run", false), async move {
        gdb.expect("-exec-run").await;
        gdb.emit(&["^running"]).await;
        drop(gdb);
    });

    assert!(matches!(reply, Err(SessionError::Abandoned)));
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn test_await_next_event_without_writing() {
    let (session, mut gdb) = connect(SessionConfig::default());

    let (reply, ()) = tokio::join!(session.execute("-exec-continue", false), async {
        gdb.expect("-exec-continue").await;
        gdb.emit(&["^running", r#"*running,thread-id="all""#]).await;
    });
    assert_eq!(reply.unwrap().subtype(), "running");

    let (reply, ()) = tokio::join!(session.await_next_event(false), async {
        gdb.emit(&[r#"*stopped,reason="signal-received",signal-name="SIGINT""#])
            .await;
    });
    assert_eq!(reply.unwrap().fields()[0], "signal-received");

    // 何も書き込まれていないことを確認する
    session.write_raw("-gdb-exit\n").await.unwrap();
    gdb.expect("-gdb-exit").await;
}

#[tokio::test]
async fn test_consumed_status_is_left_to_subscriber() {
    let stops = Arc::new(AtomicUsize::new(0));
    let any_categories = Arc::new(Mutex::new(Vec::new()));

    let mut events = EventBus::new();
    let s = Arc::clone(&stops);
    events.on_status(move |status| {
        if status.kind == StatusClass::Stopped {
            s.fetch_add(1, Ordering::SeqCst);
            status.consume();
        }
    });
    let a = Arc::clone(&any_categories);
    events.on_any(move |event| a.lock().unwrap().push(event.category()));

    let (session, mut gdb) = connect(SessionConfig::default().events(events));

    let (reply, ()) = tokio::join!(session.execute("-break-insert main", false), async {
        gdb.expect("-break-insert main").await;
        gdb.emit(&[r#"*stopped,reason="breakpoint-hit""#, r#"^done,bkpt="1""#])
            .await;
    });

    assert_eq!(reply.unwrap().subtype(), "done");
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(
        *any_categories.lock().unwrap(),
        vec![Category::Status, Category::Result]
    );
}

#[tokio::test]
async fn test_diagnostics_do_not_stop_dispatch() {
    let diagnostics = Arc::new(Mutex::new(Vec::new()));
    let mut events = EventBus::new();
    let d = Arc::clone(&diagnostics);
    events.on_diagnostic(move |diagnostic| d.lock().unwrap().push(diagnostic.clone()));

    let (session, mut gdb) = connect(SessionConfig::default().events(events));
    gdb.emit(&[r#"=thread-teleported,id="1""#, r#"^done,stray="1""#, "(gdb) "])
        .await;
    // プロンプトまで処理されれば、その前の行も処理済み
    session.wait_ready().await.unwrap();

    let (reply, ()) = tokio::join!(session.execute("-list-features", false), async {
        gdb.expect("-list-features").await;
        gdb.emit(&[r#"^done,features=["thread-info"]"#]).await;
    });
    assert_eq!(reply.unwrap().subtype(), "done");

    let diagnostics = diagnostics.lock().unwrap();
    assert_eq!(diagnostics.len(), 2);
    assert!(matches!(&diagnostics[0], Diagnostic::Parse { .. }));
    assert!(matches!(&diagnostics[1], Diagnostic::Unmatched { .. }));
}

#[tokio::test]
async fn test_subscribe_sees_events_in_order() {
    let (session, mut gdb) = connect(SessionConfig::default());
    let mut events = session.subscribe();

    gdb.emit(&[
        r#"=library-loaded,id="/lib/libc.so.6""#,
        r#"@"target says hi""#,
        r#"*running,thread-id="all""#,
    ])
    .await;

    assert_eq!(events.recv().await.unwrap().category(), Category::Activity);
    assert_eq!(events.recv().await.unwrap().category(), Category::Stream);
    assert_eq!(events.recv().await.unwrap().category(), Category::Status);
}

#[tokio::test]
async fn test_fifo_allows_overlapping_commands() {
    let config = SessionConfig::default().correlation(CorrelationOrder::Fifo);
    let (session, mut gdb) = connect(config);

    let (first, second, ()) = tokio::join!(
        session.execute("-data-evaluate-expression a", false),
        session.execute("-data-evaluate-expression b", false),
        async {
            gdb.expect("-data-evaluate-expression a").await;
            gdb.expect("-data-evaluate-expression b").await;
            gdb.emit(&[r#"^done,value="1""#, r#"^done,value="2""#]).await;
        }
    );

    assert_eq!(first.unwrap().fields(), &["1".to_string()]);
    assert_eq!(second.unwrap().fields(), &["2".to_string()]);
}

#[tokio::test]
async fn test_process_operations_need_a_process() {
    let (session, _gdb) = connect(SessionConfig::default());
    assert!(session.pid().is_none());
    assert!(matches!(session.interrupt(), Err(SessionError::NotSpawned)));
    assert!(matches!(
        session.terminate().await,
        Err(SessionError::NotSpawned)
    ));
}
