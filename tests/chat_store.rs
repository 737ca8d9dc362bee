use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
use expense_chat::{
    dao::{ChatMessageDao, DEFAULT_RECENT_LIMIT, SqliteChatMessageDao},
    error::StoreError,
    models::{ChatMessage, DEFAULT_SESSION_ID},
    store::{ChatStore, MessageStream},
};
use futures::StreamExt;
use tempfile::{TempDir, tempdir};
use tokio::time::timeout;

fn setup() -> (TempDir, SqliteChatMessageDao) {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempdir().unwrap();
    let store = ChatStore::open(dir.path().join("expense_tracker_database.db")).unwrap();
    (dir, SqliteChatMessageDao::new(store))
}

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
}

fn message(id: &str, content: &str, is_user: bool, seconds: i64, session: &str) -> ChatMessage {
    ChatMessage::new(content, is_user, session)
        .with_id(id)
        .with_timestamp(at(seconds))
}

async fn next(stream: &mut MessageStream) -> Vec<ChatMessage> {
    timeout(StdDuration::from_secs(5), stream.next())
        .await
        .expect("live query did not emit")
        .expect("live query ended")
        .expect("live query failed")
}

async fn snapshot(stream: MessageStream) -> Vec<ChatMessage> {
    let mut stream = stream;
    next(&mut stream).await
}

fn ids(messages: &[ChatMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.id.as_str()).collect()
}

#[tokio::test]
async fn session_messages_are_ordered_oldest_first() {
    let (_dir, dao) = setup();
    dao.insert_one(message("a", "hi", true, 1, "s1")).await.unwrap();
    dao.insert_one(message("b", "hello", false, 2, "s1")).await.unwrap();

    let messages = snapshot(dao.get_by_session("s1")).await;
    assert_eq!(ids(&messages), vec!["a", "b"]);
    assert_eq!(messages[0].content, "hi");
    assert!(messages[0].is_user);
    assert_eq!(messages[1].timestamp, at(2));
    assert!(!messages[1].is_user);
}

#[tokio::test]
async fn out_of_order_inserts_are_sorted_by_timestamp() {
    let (_dir, dao) = setup();
    dao.insert_one(message("late", "2", false, 20, "s1")).await.unwrap();
    dao.insert_one(message("early", "1", true, 10, "s1")).await.unwrap();

    let messages = snapshot(dao.get_by_session("s1")).await;
    assert_eq!(ids(&messages), vec!["early", "late"]);
}

#[tokio::test]
async fn repeated_upserts_keep_latest_content() {
    let (_dir, dao) = setup();
    for (i, content) in ["one", "two", "three"].iter().enumerate() {
        dao.insert_one(message("same", content, true, i as i64, "s1"))
            .await
            .unwrap();
    }

    let messages = snapshot(dao.get_recent_default()).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "three");
}

#[tokio::test]
async fn session_query_never_leaks_other_sessions() {
    let (_dir, dao) = setup();
    dao.insert_many(vec![
        message("a", "x", true, 1, "s1"),
        message("b", "y", true, 2, "s2"),
        message("c", "z", false, 3, "s1"),
        message("d", "w", true, 4, DEFAULT_SESSION_ID),
    ])
    .await
    .unwrap();

    for session in ["s1", "s2", DEFAULT_SESSION_ID, "nobody"] {
        let messages = snapshot(dao.get_by_session(session)).await;
        assert!(messages.iter().all(|m| m.session_id == session));
    }
    assert_eq!(snapshot(dao.get_by_session("s1")).await.len(), 2);
    assert!(snapshot(dao.get_by_session("nobody")).await.is_empty());
}

#[tokio::test]
async fn recent_returns_fifty_newest_across_sessions() {
    let (_dir, dao) = setup();
    let messages: Vec<ChatMessage> = (0..60)
        .map(|i| {
            let session = if i % 2 == 0 { "s1" } else { "s2" };
            message(&format!("m{i:02}"), "text", i % 3 == 0, i, session)
        })
        .collect();
    dao.insert_many(messages).await.unwrap();

    let recent = snapshot(dao.get_recent(DEFAULT_RECENT_LIMIT)).await;
    assert_eq!(recent.len(), 50);
    let expected: Vec<String> = (10..60).rev().map(|i| format!("m{i:02}")).collect();
    assert_eq!(
        recent.iter().map(|m| m.id.clone()).collect::<Vec<_>>(),
        expected
    );
    assert!(recent.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
}

#[tokio::test]
async fn recent_never_exceeds_limit() {
    let (_dir, dao) = setup();
    let messages: Vec<ChatMessage> = (0..5)
        .map(|i| message(&format!("m{i}"), "text", true, i, "s1"))
        .collect();
    dao.insert_many(messages).await.unwrap();

    for limit in [0usize, 1, 3, 5, 10] {
        let recent = snapshot(dao.get_recent(limit)).await;
        assert_eq!(recent.len(), limit.min(5));
        assert!(recent.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }
}

#[tokio::test]
async fn delete_by_session_empties_only_that_session() {
    let (_dir, dao) = setup();
    dao.insert_many(vec![
        message("a", "x", true, 1, "s1"),
        message("b", "y", false, 2, "s1"),
        message("c", "z", true, 3, "s2"),
    ])
    .await
    .unwrap();

    dao.delete_by_session("s1").await.unwrap();
    assert!(snapshot(dao.get_by_session("s1")).await.is_empty());
    assert_eq!(ids(&snapshot(dao.get_by_session("s2")).await), vec!["c"]);

    // Nothing left to delete.
    dao.delete_by_session("s1").await.unwrap();
}

#[tokio::test]
async fn delete_all_empties_the_store() {
    let (_dir, dao) = setup();
    dao.insert_many(vec![
        message("a", "x", true, 1, "s1"),
        message("b", "y", false, 2, "s2"),
    ])
    .await
    .unwrap();

    dao.delete_all().await.unwrap();
    assert!(snapshot(dao.get_recent(50)).await.is_empty());
}

#[tokio::test]
async fn delete_one_removes_by_identity() {
    let (_dir, dao) = setup();
    let kept = message("a", "x", true, 1, "s1");
    let removed = message("b", "y", false, 2, "s1");
    dao.insert_many(vec![kept.clone(), removed.clone()]).await.unwrap();

    // Identity is the id; other fields do not need to match.
    let mut stale = removed.clone();
    stale.content = "edited elsewhere".to_string();
    dao.delete_one(&stale).await.unwrap();
    dao.delete_one(&stale).await.unwrap();

    assert_eq!(snapshot(dao.get_by_session("s1")).await, vec![kept]);
}

#[tokio::test]
async fn live_session_query_follows_writes() {
    let (_dir, dao) = setup();
    let mut live = dao.get_by_session("s1");
    assert!(next(&mut live).await.is_empty());

    dao.insert_one(message("a", "hi", true, 1, "s1")).await.unwrap();
    assert_eq!(ids(&next(&mut live).await), vec!["a"]);

    dao.insert_one(message("a", "hi again", true, 1, "s1")).await.unwrap();
    assert_eq!(next(&mut live).await[0].content, "hi again");

    dao.delete_one(&message("a", "", true, 1, "s1")).await.unwrap();
    assert!(next(&mut live).await.is_empty());
}

#[tokio::test]
async fn live_session_query_ignores_other_sessions() {
    let (_dir, dao) = setup();
    let mut live = dao.get_by_session("s1");
    assert!(next(&mut live).await.is_empty());

    dao.insert_one(message("x", "elsewhere", true, 1, "s2")).await.unwrap();
    assert!(
        timeout(StdDuration::from_millis(300), live.next())
            .await
            .is_err(),
        "write to another session must not re-emit"
    );

    dao.insert_one(message("a", "hi", true, 2, "s1")).await.unwrap();
    assert_eq!(ids(&next(&mut live).await), vec!["a"]);
}

#[tokio::test]
async fn live_query_sees_batches_whole() {
    let (_dir, dao) = setup();
    let mut live = dao.get_recent(10);
    assert!(next(&mut live).await.is_empty());

    dao.insert_many(vec![
        message("m1", "one", true, 1, "s1"),
        message("m2", "two", false, 2, "s1"),
    ])
    .await
    .unwrap();

    let messages = next(&mut live).await;
    assert_eq!(ids(&messages), vec!["m2", "m1"]);
}

#[tokio::test]
async fn concurrent_reader_never_sees_half_a_batch() {
    let (_dir, dao) = setup();

    let reader_dao = dao.clone();
    let reader = tokio::spawn(async move {
        for _ in 0..50 {
            let messages = snapshot(reader_dao.get_by_session("s1")).await;
            assert!(messages.is_empty() || messages.len() == 2, "saw {}", messages.len());
        }
    });

    for round in 0..20 {
        dao.insert_many(vec![
            message("m1", &format!("one {round}"), true, 1, "s1"),
            message("m2", &format!("two {round}"), false, 2, "s1"),
        ])
        .await
        .unwrap();
        dao.delete_by_session("s1").await.unwrap();
    }

    reader.await.unwrap();
}

#[tokio::test]
async fn new_subscription_starts_with_full_snapshot() {
    let (_dir, dao) = setup();
    dao.insert_one(message("a", "hi", true, 1, "s1")).await.unwrap();

    let mut first = dao.get_by_session("s1");
    assert_eq!(next(&mut first).await.len(), 1);
    drop(first);

    dao.insert_one(message("b", "hello", false, 2, "s1")).await.unwrap();
    let mut second = dao.get_by_session("s1");
    assert_eq!(ids(&next(&mut second).await), vec!["a", "b"]);
}

#[tokio::test]
async fn live_query_ends_when_store_closes() {
    let (_dir, dao) = setup();
    let mut live = dao.get_by_session("s1");
    assert!(next(&mut live).await.is_empty());

    drop(dao);
    let ended = timeout(StdDuration::from_secs(5), live.next())
        .await
        .expect("stream did not finish");
    assert!(ended.is_none());
}

#[tokio::test]
async fn messages_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chat.db");

    {
        let dao = SqliteChatMessageDao::new(ChatStore::open(&path).unwrap());
        dao.insert_one(message("a", "persisted", true, 1, "s1")).await.unwrap();
    }

    let dao = SqliteChatMessageDao::new(ChatStore::open(&path).unwrap());
    let messages = snapshot(dao.get_by_session("s1")).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "persisted");
}

/// Make every insert and delete on `chat_messages` abort from a second connection.
fn break_writes(path: &std::path::Path) {
    let mut conn = SqliteConnection::establish(&path.to_string_lossy()).unwrap();
    conn.batch_execute(
        "PRAGMA busy_timeout = 30000;
         CREATE TRIGGER fail_insert BEFORE INSERT ON chat_messages
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;
         CREATE TRIGGER fail_delete BEFORE DELETE ON chat_messages
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .unwrap();
}

#[tokio::test]
async fn write_faults_reach_the_caller() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempdir().unwrap();
    let path = dir.path().join("chat.db");
    let store = ChatStore::open(&path).unwrap();
    let dao = SqliteChatMessageDao::new(store.clone());
    dao.insert_one(message("a", "kept", true, 1, "s1")).await.unwrap();
    let version = store.change_version();

    break_writes(&path);

    assert!(matches!(
        dao.insert_one(message("b", "x", true, 2, "s1")).await,
        Err(StoreError::Query(_))
    ));
    assert!(matches!(
        dao.insert_many(vec![
            message("c", "x", true, 3, "s1"),
            message("d", "y", false, 4, "s1"),
        ])
        .await,
        Err(StoreError::Query(_))
    ));
    assert!(dao.delete_by_id("a").await.is_err());
    assert!(dao.delete_by_session("s1").await.is_err());
    assert!(dao.delete_all().await.is_err());

    assert_eq!(ids(&snapshot(dao.get_by_session("s1")).await), vec!["a"]);
    assert_eq!(store.change_version(), version);
}

#[test]
fn open_fails_on_unusable_path() {
    let dir = tempdir().unwrap();
    let result = ChatStore::open(dir.path());
    assert!(result.is_err(), "opening a directory as a database must fail");
}
