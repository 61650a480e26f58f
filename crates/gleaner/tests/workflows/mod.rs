use super::*;

mod resume;

const A: Paper = Paper::new("2403.00001v1", "Jailbreaking Assistants", 1);
const B: Paper = Paper::new("2403.00002v1", "Prompt Injection in the Wild", 3);
const STALE: Paper = Paper::new("2402.00003v1", "Last Month's News", 10);

fn arxiv() -> FakeArxiv {
  FakeArxiv::default()
    .with_results("all:jailbreak", vec![A, B, STALE])
    .with_results("all:injection", vec![B])
}

#[traced_test]
#[tokio::test]
async fn test_full_run_then_quiet_rerun() -> TestResult<()> {
  let dir = tempdir()?;
  let config = test_config(&dir, &["all:jailbreak", "all:injection"]);
  let (arxiv, model, outbox) = (arxiv(), FakeModel::default(), Outbox::default());
  let pipeline = test_pipeline(&config, &arxiv, &model, &outbox);
  let mut db = open_store(&config).await;

  let report = pipeline.run(&mut db, now()).await?;
  // Two pages for the first query (3 results, 2 per page), one for the second.
  assert_eq!(report.pages, 3);
  assert_eq!(report.discovered, 3);
  assert_eq!(report.inserted, 3);
  assert_eq!(report.fetch.downloaded, 2);
  assert_eq!(report.summarize.summarized, 2);
  assert_eq!(report.digest.sent, 1);
  assert_eq!(report.digest.marked, 2);

  {
    let sent = outbox.sent.lock().unwrap();
    assert_eq!(sent[0].recipient, "reader@example.com");
    assert_eq!(sent[0].subject, "[2024-03-15] Research Digest");
    // Newest first
    let plain = &sent[0].body.plain;
    assert!(plain.find("Jailbreaking Assistants") < plain.find("Prompt Injection in the Wild"));
    assert!(!plain.contains("Last Month"));
  }
  assert!(config.paper_dir.join("2403.00001v1.pdf").is_file());
  assert!(!config.paper_dir.join("2402.00003v1.pdf").exists());

  let rerun = pipeline.run(&mut db, now()).await?;
  assert_eq!(rerun.inserted, 0);
  assert_eq!(rerun.fetch.requested, 0);
  assert_eq!(rerun.summarize.considered, 0);
  assert_eq!(rerun.digest.selected, 0);
  assert_eq!(outbox.sent.lock().unwrap().len(), 1);
  assert_eq!(arxiv.requests("/pdf/").len(), 2);

  let items = Query::list_all().execute(&mut db).await?;
  assert_eq!(items.len(), 3);
  let stale = items.iter().find(|item| item.id == STALE.id).unwrap();
  assert!(!stale.downloaded && !stale.summarized && !stale.shared);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_share_all_policy_repeats_digest() -> TestResult<()> {
  let dir = tempdir()?;
  let mut config = test_config(&dir, &["all:jailbreak"]);
  config.digest.share_policy = SharePolicy::All;
  let (arxiv, model, outbox) = (arxiv(), FakeModel::default(), Outbox::default());
  let pipeline = test_pipeline(&config, &arxiv, &model, &outbox);
  let mut db = open_store(&config).await;

  pipeline.run(&mut db, now()).await?;
  let rerun = pipeline.run(&mut db, now()).await?;
  assert_eq!(rerun.digest.selected, 2);
  assert_eq!(rerun.digest.marked, 0);

  let sent = outbox.sent.lock().unwrap();
  assert_eq!(sent.len(), 2);
  assert_eq!(sent[0].body, sent[1].body);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_search_outage_is_not_fatal() -> TestResult<()> {
  let dir = tempdir()?;
  let mut config = test_config(&dir, &["all:jailbreak"]);
  config.base_url = "https://export.arxiv.org/unavailable".to_string();
  let (arxiv, model, outbox) = (arxiv(), FakeModel::default(), Outbox::default());
  let pipeline = test_pipeline(&config, &arxiv, &model, &outbox);
  let mut db = open_store(&config).await;

  let report = pipeline.run(&mut db, now()).await?;
  assert_eq!(report.pages, 0);
  assert_eq!(report.digest.sent, 0);
  assert!(Query::list_all().execute(&mut db).await?.is_empty());
  Ok(())
}
