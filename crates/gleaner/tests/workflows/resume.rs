use super::*;

#[traced_test]
#[tokio::test]
async fn test_failed_summary_is_retried_and_shared_next_run() -> TestResult<()> {
  let dir = tempdir()?;
  let config = test_config(&dir, &["all:jailbreak"]);
  let (arxiv, model, outbox) = (arxiv(), FakeModel::default(), Outbox::default());
  model.fail_once.lock().unwrap().insert(format!("payload {}", B.id));
  let pipeline = test_pipeline(&config, &arxiv, &model, &outbox);
  let mut db = open_store(&config).await;

  let first = pipeline.run(&mut db, now()).await?;
  assert_eq!(first.summarize.summarized, 1);
  assert_eq!(first.summarize.skipped, 1);
  assert_eq!(first.digest.marked, 1);

  let second = pipeline.run(&mut db, now()).await?;
  assert_eq!(second.summarize.considered, 1);
  assert_eq!(second.summarize.summarized, 1);
  assert_eq!(second.digest.selected, 1);

  let sent = outbox.sent.lock().unwrap();
  assert_eq!(sent.len(), 2);
  assert!(sent[0].body.plain.contains(A.title) && !sent[0].body.plain.contains(B.title));
  assert!(sent[1].body.plain.contains(B.title) && !sent[1].body.plain.contains(A.title));
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_deleted_payload_is_fetched_again_for_summary() -> TestResult<()> {
  let dir = tempdir()?;
  let config = test_config(&dir, &["all:jailbreak"]);
  let (arxiv, model, outbox) = (arxiv(), FakeModel::default(), Outbox::default());
  model.fail_once.lock().unwrap().insert(format!("payload {}", A.id));
  let pipeline = test_pipeline(&config, &arxiv, &model, &outbox);
  let mut db = open_store(&config).await;

  pipeline.run(&mut db, now()).await?;
  std::fs::remove_file(config.paper_dir.join("2403.00001v1.pdf"))?;

  let second = pipeline.run(&mut db, now()).await?;
  assert_eq!(second.summarize.summarized, 1);
  assert!(config.paper_dir.join("2403.00001v1.pdf").is_file());
  assert_eq!(arxiv.requests(&format!("/pdf/{}", A.id)).len(), 2);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_window_moves_with_the_clock() -> TestResult<()> {
  let dir = tempdir()?;
  let config = test_config(&dir, &["all:jailbreak"]);
  let (arxiv, model, outbox) = (arxiv(), FakeModel::default(), Outbox::default());
  model.fail_once.lock().unwrap().insert(format!("payload {}", B.id));
  let pipeline = test_pipeline(&config, &arxiv, &model, &outbox);
  let mut db = open_store(&config).await;

  pipeline.run(&mut db, now()).await?;

  // Five days later B (three days old at first) has left the window and is not retried.
  let later = pipeline.run(&mut db, now() + TimeDelta::days(5)).await?;
  assert_eq!(later.summarize.considered, 0);
  assert_eq!(later.digest.selected, 0);

  let b = Query::by_id(B.id).execute(&mut db).await?;
  assert!(!b[0].summarized);
  Ok(())
}
