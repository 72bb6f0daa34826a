use super::{meeting, resolution};
use crate::Error;
use crate::db::*;
use tempfile::NamedTempFile;

async fn seeded_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    db.seed_states().await.unwrap();
    (db, temp_file)
}

#[tokio::test]
async fn test_seed_states_is_idempotent() {
    let (db, _file) = seeded_db().await;
    db.seed_states().await.unwrap();

    let states = db.states().await.unwrap();
    assert_eq!(states, vec!["USA", "UK", "France", "China", "Russia"]);
}

#[tokio::test]
async fn test_committed_unit_is_visible() {
    let (db, _file) = seeded_db().await;

    let mut unit = db.begin().await.unwrap();
    let mut vetoed = meeting("S/PV.8697");
    vetoed.veto_used_in_meeting = true;
    unit.upsert(vetoed.into()).await.unwrap();
    unit.upsert(resolution("S/2019/961", "S/PV.8697", ResolutionStatus::Vetoed).into())
        .await
        .unwrap();
    for state in ["Russia", "China"] {
        unit.upsert(
            VetoCast {
                draft_id: "S/2019/961".to_string(),
                state: state.to_string(),
            }
            .into(),
        )
        .await
        .unwrap();
    }
    unit.commit().await.unwrap();

    let stored = db.get_meeting("S/PV.8697").await.unwrap().unwrap();
    assert!(stored.veto_used_in_meeting);
    assert_eq!(stored.year, Some(2019));

    let res = db.get_resolution("S/2019/961").await.unwrap().unwrap();
    assert_eq!(res.status, "vetoed");
    assert_eq!(res.meeting_id.as_deref(), Some("S/PV.8697"));

    assert_eq!(
        db.veto_casters("S/2019/961").await.unwrap(),
        vec!["China", "Russia"]
    );
}

#[tokio::test]
async fn test_rolled_back_unit_leaves_nothing() {
    let (db, _file) = seeded_db().await;

    let mut unit = db.begin().await.unwrap();
    unit.upsert(meeting("S/PV.1").into()).await.unwrap();
    unit.rollback().await.unwrap();

    assert!(db.get_meeting("S/PV.1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_dropped_unit_leaves_nothing() {
    let (db, _file) = seeded_db().await;

    {
        let mut unit = db.begin().await.unwrap();
        unit.upsert(meeting("S/PV.2").into()).await.unwrap();
    }

    assert!(db.get_meeting("S/PV.2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_resolution_is_conflict() {
    let (db, _file) = seeded_db().await;

    let mut unit = db.begin().await.unwrap();
    unit.upsert(meeting("S/PV.8697").into()).await.unwrap();
    unit.upsert(resolution("S/2019/962", "S/PV.8697", ResolutionStatus::NotAdopted).into())
        .await
        .unwrap();
    unit.commit().await.unwrap();

    let mut unit = db.begin().await.unwrap();
    unit.upsert(meeting("S/PV.8697").into()).await.unwrap();
    let err = unit
        .upsert(resolution("S/2019/962", "S/PV.8697", ResolutionStatus::NotAdopted).into())
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err:?}");
    unit.rollback().await.unwrap();

    assert_eq!(db.resolutions_for_meeting("S/PV.8697").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_meeting_upsert_updates_and_keeps_veto_flag() {
    let (db, _file) = seeded_db().await;

    let mut first = meeting("S/PV.10");
    first.veto_used_in_meeting = true;
    let mut unit = db.begin().await.unwrap();
    unit.upsert(first.into()).await.unwrap();
    unit.commit().await.unwrap();

    let mut second = meeting("S/PV.10");
    second.topic = "Updated topic".to_string();
    let mut unit = db.begin().await.unwrap();
    unit.upsert(second.into()).await.unwrap();
    unit.commit().await.unwrap();

    let stored = db.get_meeting("S/PV.10").await.unwrap().unwrap();
    assert_eq!(stored.topic.as_deref(), Some("Updated topic"));
    assert!(stored.veto_used_in_meeting);
}

#[tokio::test]
async fn test_veto_by_unknown_state_is_inconsistency() {
    let (db, _file) = seeded_db().await;

    let mut unit = db.begin().await.unwrap();
    unit.upsert(meeting("S/PV.3").into()).await.unwrap();
    unit.upsert(resolution("S/100", "S/PV.3", ResolutionStatus::Vetoed).into())
        .await
        .unwrap();
    let err = unit
        .upsert(
            VetoCast {
                draft_id: "S/100".to_string(),
                state: "Atlantis".to_string(),
            }
            .into(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DataInconsistency(_)));
}

#[tokio::test]
async fn test_finished_unit_rejects_writes() {
    let (db, _file) = seeded_db().await;

    let mut unit = db.begin().await.unwrap();
    unit.commit().await.unwrap();

    let err = unit.upsert(meeting("S/PV.4").into()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Database(crate::error::DatabaseError::Finished)
    ));
    assert!(unit.commit().await.is_err());
    unit.rollback().await.unwrap();
}
