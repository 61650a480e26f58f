use gleaner::{
  database::{Add, Update},
  item::ItemRecord,
  llm::Summary,
  normalize::{normalize, upsert},
  window::Window,
};

use super::*;

fn summary() -> Summary {
  Summary { findings: vec!["One.".into(), "Two.".into(), "Three.".into()], one_liner: "Neat.".into() }
}

#[traced_test]
#[tokio::test]
async fn test_flags_never_regress_on_rediscovery() -> TestResult<()> {
  let dir = tempdir()?;
  let mut db = Database::open(dir.path().join("gleaner.db")).await?;
  let record = ItemRecord::discovered("2403.00001v1", "Paper", now() - TimeDelta::days(1));

  assert_eq!(upsert(&mut db, &[record.clone()]).await?, 1);
  Update::downloaded(&record.id).execute(&mut db).await?;
  Update::summarized(&record.id, &summary()).execute(&mut db).await?;
  Update::shared(&record.id).execute(&mut db).await?;

  // A fresh discovery carries cleared flags; inserting it must not reset anything.
  assert_eq!(upsert(&mut db, &[record.clone()]).await?, 0);
  assert!(!Add::item(&record).execute(&mut db).await?);

  let stored = Query::by_id(&record.id).execute(&mut db).await?;
  assert!(stored[0].downloaded && stored[0].summarized && stored[0].shared);
  assert_eq!(stored[0].findings.len(), 3);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_same_page_twice_yields_one_record_per_id() -> TestResult<()> {
  let dir = tempdir()?;
  let config = test_config(&dir, &["all:jailbreak"]);
  let arxiv = FakeArxiv::default().with_results("all:jailbreak", vec![
    Paper::new("2403.00001v1", "One", 1),
    Paper::new("2403.00002v1", "Two", 2),
  ]);
  let collector =
    gleaner::collector::Collector::new(&arxiv, &config.base_url, config.page_size)?;
  let mut db = open_store(&config).await;

  for _ in 0..2 {
    let pages = collector.collect(&config.searches).await;
    upsert(&mut db, &normalize(&pages)).await?;
  }
  assert_eq!(Query::list_all().execute(&mut db).await?.len(), 2);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_window_boundary_matches_store_queries() -> TestResult<()> {
  let dir = tempdir()?;
  let mut db = Database::open(dir.path().join("gleaner.db")).await?;
  let window = Window::trailing_days(now(), 7);
  let records: Vec<_> = [8, 6, 1]
    .into_iter()
    .map(|days| ItemRecord::discovered(format!("2403.0000{days}v1"), "Paper", now() - TimeDelta::days(days)))
    .collect();
  upsert(&mut db, &records).await?;

  let in_store: Vec<_> = Query::pending_summary(window.start())
    .execute(&mut db)
    .await?
    .into_iter()
    .map(|record| record.id)
    .collect();
  let in_memory: Vec<_> =
    records.iter().filter(|r| window.contains(&r.published)).map(|r| r.id.clone()).collect();

  assert_eq!(in_store, in_memory);
  assert_eq!(in_store, ["2403.00006v1", "2403.00001v1"]);
  Ok(())
}
