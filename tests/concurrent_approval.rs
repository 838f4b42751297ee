use amistd::model::{ClaimFilter, ClaimStatus, Decision, NewReward, TransactionType};
use amistd::{Amist, NewTransaction, Role, SqliteStore};
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn open(workspace: &PathBuf) -> Amist<SqliteStore> {
    Amist::new(SqliteStore::open(workspace).expect("open store"))
}

#[test]
fn concurrent_approvals_never_overspend_points_or_stock() {
    let workspace = temp_dir("amist-concurrent-approval");
    let (student, teacher, reward, claims) = {
        let core = open(&workspace);
        let teacher = core
            .create_user("profe@escuela.cl", "Profe", Role::Teacher)
            .expect("teacher");
        let student = core
            .create_user("ana@escuela.cl", "Ana", Role::Student)
            .expect("student");
        core.record_transaction(NewTransaction {
            user_id: &student.id,
            amount: 100,
            kind: TransactionType::Assignment,
            description: "tareas",
            created_by: Some(&teacher.id),
            related_id: None,
        })
        .expect("award");
        let reward = core
            .create_reward(NewReward {
                title: "Entrada al cine".into(),
                points_cost: 60,
                stock: 1,
                active: true,
                created_by: teacher.id.clone(),
                ..NewReward::default()
            })
            .expect("reward");
        let c1 = core.request_redemption(&student.id, &reward.id).expect("claim 1");
        let c2 = core.request_redemption(&student.id, &reward.id).expect("claim 2");
        (student.id, teacher.id, reward.id, vec![c1.id, c2.id])
    };

    let barrier = Arc::new(Barrier::new(claims.len()));
    let handles: Vec<_> = claims
        .into_iter()
        .map(|claim_id| {
            let workspace = workspace.clone();
            let teacher = teacher.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let core = open(&workspace);
                barrier.wait();
                core.process_claim(&claim_id, Decision::Approve, &teacher, None)
                    .expect("process claim")
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();

    let approved = results
        .iter()
        .filter(|c| c.status == ClaimStatus::Approved)
        .count();
    let rejected: Vec<_> = results
        .iter()
        .filter(|c| c.status == ClaimStatus::Rejected)
        .collect();
    assert_eq!(approved, 1);
    assert_eq!(rejected.len(), 1);
    assert!(rejected[0].reason.is_some());

    let core = open(&workspace);
    assert_eq!(core.get_balance(&student).expect("balance"), 40);
    assert_eq!(core.get_reward(&reward).expect("reward").stock, 0);
    let debits = core
        .list_transactions(
            &student,
            &amistd::model::TransactionFilter {
                kind: Some(TransactionType::Reward),
                ..Default::default()
            },
        )
        .expect("ledger");
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].amount, -60);
    let pending = core
        .list_claims(&ClaimFilter {
            status: Some(ClaimStatus::Pending),
            ..Default::default()
        })
        .expect("claims");
    assert!(pending.is_empty());

    let _ = std::fs::remove_dir_all(workspace);
}
