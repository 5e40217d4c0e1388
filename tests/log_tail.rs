// tests/log_tail.rs

use std::sync::Arc;

use futures::StreamExt;
use proptest::prelude::*;

use procstream::exec::{NiceSettings, NiceSpawner, SpawnOptions, TokioLauncher};
use procstream::pipeline::{ErrorExtractor, LogTail, LogTailBuilder, PipelineError};
use procstream::probe::{CacheSettings, CapabilityCache};
use procstream::stream::{ProcessEvent, ProcessEvents};
use procstream::subscribe_tail;
use procstream::types::ExitPolicy;
use procstream_test_utils::fakes::{lines_then_exit, scripted, FakeResolver};
use procstream_test_utils::{init_tracing, strings, with_timeout};

type Items = Vec<Result<String, PipelineError>>;

async fn run(builder: &LogTailBuilder, events: Vec<ProcessEvent>) -> Items {
    builder.build(scripted(events)).collect().await
}

#[tokio::test]
async fn error_line_split_across_reads_keeps_full_context() {
    let items = run(
        &LogTailBuilder::new(),
        vec![
            ProcessEvent::stdout("ERROR: di"),
            ProcessEvent::stdout("sk full\n"),
            ProcessEvent::exit(1),
        ],
    )
    .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "ERROR: disk full");
    assert_eq!(items[1].as_ref().unwrap_err().to_string(), "disk full");
}

#[tokio::test]
async fn error_context_outlives_normal_lines() {
    let items = run(
        &LogTailBuilder::new(),
        lines_then_exit(&["ERROR: disk full", "normal line"], 1),
    )
    .await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap(), "ERROR: disk full");
    assert_eq!(items[1].as_ref().unwrap(), "normal line");
    match &items[2] {
        Err(PipelineError::Exited { message, code, .. }) => {
            assert_eq!(message, "disk full");
            assert_eq!(*code, 1);
        }
        other => panic!("expected Exited, got {other:?}"),
    }
}

#[tokio::test]
async fn failure_without_error_line_has_empty_message() {
    let items = run(&LogTailBuilder::new(), lines_then_exit(&["hello"], 1)).await;

    assert_eq!(items.len(), 2);
    let err = items[1].as_ref().unwrap_err();
    assert_eq!(err.to_string(), "");
}

#[tokio::test]
async fn skip_drops_leading_lines() {
    let builder = LogTailBuilder::new()
        .skip(1)
        .exit_policy(ExitPolicy::NonZero);
    let items = run(&builder, lines_then_exit(&["A", "B", "C"], 0)).await;

    let lines: Vec<_> = items.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(lines, vec!["B", "C"]);
}

#[tokio::test]
async fn spawn_error_surfaces_as_spawn_failure() {
    let items = run(
        &LogTailBuilder::new(),
        vec![ProcessEvent::spawn_error(
            procstream::errors::ProcstreamError::AlreadySubscribed,
        )],
    )
    .await;

    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(PipelineError::Spawn(_))));
}

#[tokio::test]
async fn custom_extractor_is_used() {
    let extractor = ErrorExtractor::from_pattern(r"^E/\w+\(\s*\d+\):\s*(.*)").unwrap();
    let builder = LogTailBuilder::new().extractor(extractor);
    let items = run(
        &builder,
        lines_then_exit(&["I/Tag( 12): fine", "E/Tag( 12): crashed hard"], 1),
    )
    .await;

    assert_eq!(items.last().unwrap().as_ref().unwrap_err().to_string(), "crashed hard");
}

fn real_spawner() -> (Arc<NiceSpawner>, TokioLauncher) {
    let cache = Arc::new(CapabilityCache::new(
        Arc::new(FakeResolver::empty()),
        CacheSettings::default(),
    ));
    let launcher = TokioLauncher::new();
    let spawner = Arc::new(NiceSpawner::new(
        cache,
        Arc::new(launcher.clone()),
        NiceSettings::default(),
    ));
    (spawner, launcher)
}

fn sh_tail(
    spawner: Arc<NiceSpawner>,
    script: &str,
    builder: &LogTailBuilder,
) -> LogTail<ProcessEvents> {
    subscribe_tail(
        spawner,
        "sh".to_string(),
        strings(&["-c", script]),
        SpawnOptions::default(),
        builder,
    )
    .unwrap()
}

#[tokio::test]
async fn tails_a_real_process_end_to_end() {
    init_tracing();
    let (spawner, launcher) = real_spawner();

    let tail = sh_tail(
        spawner,
        "echo first; echo 'ERROR: boom'; echo after; exit 2",
        &LogTailBuilder::new(),
    );
    let items: Items = with_timeout(tail.collect()).await;

    assert_eq!(items.len(), 4);
    assert_eq!(items[0].as_ref().unwrap(), "first");
    assert_eq!(items[1].as_ref().unwrap(), "ERROR: boom");
    assert_eq!(items[2].as_ref().unwrap(), "after");
    match &items[3] {
        Err(PipelineError::Exited { message, code, .. }) => {
            assert_eq!(message, "boom");
            assert_eq!(*code, 2);
        }
        other => panic!("expected Exited, got {other:?}"),
    }
    assert_eq!(launcher.live_handles(), 0);
}

#[tokio::test]
async fn skip_applies_to_lines_of_a_single_write() {
    init_tracing();
    let (spawner, _launcher) = real_spawner();
    let builder = LogTailBuilder::new()
        .skip(1)
        .exit_policy(ExitPolicy::NonZero);

    let tail = sh_tail(spawner, r"printf 'A\nB\nC\n'; exit 0", &builder);
    let items: Items = with_timeout(tail.collect()).await;

    let lines: Vec<_> = items.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(lines, vec!["B", "C"]);
}

#[tokio::test]
async fn unterminated_last_line_is_delivered() {
    init_tracing();
    let (spawner, _launcher) = real_spawner();

    let tail = sh_tail(
        spawner,
        r"printf 'ok\nERROR: no newline'; exit 4",
        &LogTailBuilder::new(),
    );
    let items: Items = with_timeout(tail.collect()).await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[1].as_ref().unwrap(), "ERROR: no newline");
    assert_eq!(items[2].as_ref().unwrap_err().to_string(), "no newline");
}

#[tokio::test]
async fn unsubscribe_tears_down_the_process() {
    init_tracing();
    let (spawner, launcher) = real_spawner();

    let mut tail = sh_tail(spawner, "echo a; exec sleep 30", &LogTailBuilder::new());

    assert_eq!(with_timeout(tail.next()).await.unwrap().unwrap(), "a");
    assert_eq!(launcher.live_handles(), 1);

    with_timeout(tail.unsubscribe()).await;
    assert_eq!(launcher.live_handles(), 0);
}

proptest! {
    #[test]
    fn skip_yields_suffix(lines in proptest::collection::vec("[a-z]{1,8}", 0..12), skip in 0usize..16) {
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let builder = LogTailBuilder::new()
            .skip(skip)
            .exit_policy(ExitPolicy::NonZero);

        let items = futures::executor::block_on(run(&builder, lines_then_exit(&refs, 0)));
        let got: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();

        let expected: Vec<String> = lines.iter().skip(skip).cloned().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn read_boundaries_do_not_change_lines(
        lines in proptest::collection::vec("[a-zA-Z :]{0,10}", 1..8),
        cuts in proptest::collection::vec(any::<usize>(), 0..6),
    ) {
        let text: String = lines.iter().map(|l| format!("{l}\n")).collect();
        let bytes = text.as_bytes();

        let mut offsets: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
        offsets.push(0);
        offsets.push(bytes.len());
        offsets.sort_unstable();
        offsets.dedup();

        let mut events: Vec<ProcessEvent> = offsets
            .windows(2)
            .map(|w| ProcessEvent::stdout(&bytes[w[0]..w[1]]))
            .collect();
        events.push(ProcessEvent::exit(0));

        let builder = LogTailBuilder::new().exit_policy(ExitPolicy::NonZero);
        let items = futures::executor::block_on(run(&builder, events));
        let got: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();

        prop_assert_eq!(got, lines);
    }
}
