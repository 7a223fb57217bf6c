//! Races over shared products and shared requests
//!
//! The one-active-swap-per-product invariant has to hold under concurrent
//! acceptance, not just in sequence. These tests hammer the same product
//! (or the same request) from several threads and count the winners.

use std::sync::Arc;
use std::thread;
use swap_engine::product::{Condition, ProductDraft};
use swap_engine::user::UserDraft;
use swap_engine::{
    ConflictError, MemorySink, ProductId, SwapDecision, SwapError, SwapOutcome, SwapService,
    UserId, ValidationError,
};
use tempfile::tempdir;

fn open_service(name: &str) -> anyhow::Result<(Arc<SwapService>, tempfile::TempDir)> {
    let temp_dir = tempdir()?;
    let db = sled::open(temp_dir.path().join(name))?;
    let service = SwapService::new(Arc::new(db), Arc::new(MemorySink::new()));
    Ok((Arc::new(service), temp_dir))
}

fn seed_user(service: &SwapService, email: &str) -> anyhow::Result<UserId> {
    let user = service.register_user(UserDraft::new().email(email).display_name(email))?;
    Ok(user.user_id)
}

fn seed_product(service: &SwapService, owner: &UserId, title: &str) -> anyhow::Result<ProductId> {
    let product = service.list_product(
        ProductDraft::new()
            .owner(owner.clone())
            .title(title)
            .condition(Condition::Used),
    )?;
    Ok(product.product_id)
}

fn is_losing_error(err: &SwapError) -> bool {
    matches!(
        err,
        SwapError::Validation(ValidationError::ProductUnavailable(_))
            | SwapError::Conflict(ConflictError::AlreadyResolved(_))
    )
}

#[test]
fn concurrent_accepts_on_a_shared_target_admit_exactly_one() -> anyhow::Result<()> {
    let (service, _tmp) = open_service("concurrent_accepts.db")?;

    let owner = seed_user(&service, "owner@example.com")?;
    let target = seed_product(&service, &owner, "Road bike")?;

    let mut request_ids = Vec::new();
    for i in 0..8 {
        let requester = seed_user(&service, &format!("requester{i}@example.com"))?;
        let request = service.create_swap_request(&requester, &target, None, None)?;
        request_ids.push(request.request_id);
    }

    let handles: Vec<_> = request_ids
        .into_iter()
        .map(|request_id| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service.respond_to_swap_request(&request_id, SwapDecision::Accept)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("accept thread panicked"))
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent accept may succeed");
    for result in &results {
        if let Err(err) = result {
            assert!(is_losing_error(err), "unexpected loser error: {err}");
        }
    }

    // the surviving swap holds the target; nobody else does
    let winning_swap = results
        .into_iter()
        .flatten()
        .find_map(|outcome| match outcome {
            SwapOutcome::Accepted(swap) => Some(swap),
            SwapOutcome::Rejected(_) => None,
        })
        .expect("a winner must exist");
    assert_eq!(
        service.store().active_swap_for_product(&target)?,
        Some(winning_swap.swap_id)
    );

    Ok(())
}

#[test]
fn concurrent_accepts_of_one_request_resolve_it_once() -> anyhow::Result<()> {
    let (service, _tmp) = open_service("double_accept.db")?;

    let owner = seed_user(&service, "owner@example.com")?;
    let requester = seed_user(&service, "requester@example.com")?;
    let target = seed_product(&service, &owner, "Espresso machine")?;
    let request = service.create_swap_request(&requester, &target, None, None)?;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            let request_id = request.request_id.clone();
            thread::spawn(move || {
                service.respond_to_swap_request(&request_id, SwapDecision::Accept)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("accept thread panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in &results {
        if let Err(err) = result {
            assert!(is_losing_error(err), "unexpected loser error: {err}");
        }
    }

    Ok(())
}

#[test]
fn concurrent_completions_flip_availability_once() -> anyhow::Result<()> {
    let (service, _tmp) = open_service("double_complete.db")?;

    let owner = seed_user(&service, "owner@example.com")?;
    let requester = seed_user(&service, "requester@example.com")?;
    let target = seed_product(&service, &owner, "Game console")?;
    let offered = seed_product(&service, &requester, "Board games")?;

    let request = service.create_swap_request(&requester, &target, Some(&offered), None)?;
    let SwapOutcome::Accepted(swap) =
        service.respond_to_swap_request(&request.request_id, SwapDecision::Accept)?
    else {
        panic!("expected acceptance");
    };

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            let swap_id = swap.swap_id.clone();
            thread::spawn(move || service.complete_swap(&swap_id))
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("complete thread panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(err, SwapError::Conflict(ConflictError::AlreadyResolved(_))),
                "unexpected loser error: {err}"
            );
        }
    }

    // availability flipped exactly once; version moved exactly once
    let target_row = service.product(&target)?;
    let offered_row = service.product(&offered)?;
    assert!(!target_row.is_available);
    assert!(!offered_row.is_available);
    assert_eq!(target_row.version, 1);
    assert_eq!(offered_row.version, 1);

    Ok(())
}
