//! End-to-end scheduler scenarios against the simulated exchange.

use std::collections::HashMap;
use std::sync::Arc;

use lip_bot::{AppConfig, Application};
use lip_core::{ContractSide, OrderSide, Price, Ticker, TimeInForce};
use lip_exchange::{
    BookLevel, BookSnapshot, ExchangeError, FillEvent, MarketInfo, OrderId, SimExchange,
};
use lip_feed::TouchUpdate;
use lip_mm::MarketPhase;
use lip_risk::{VolEntry, VolSnapshot};

const NOW: i64 = 1_700_000_000;

fn level(cents: i64, count: u32) -> BookLevel {
    BookLevel {
        price: Price::from_cents(cents),
        count,
    }
}

fn snapshot(yes: &[(i64, u32)], no: &[(i64, u32)]) -> BookSnapshot {
    BookSnapshot {
        yes_bids: yes.iter().map(|&(p, c)| level(p, c)).collect(),
        no_bids: no.iter().map(|&(p, c)| level(p, c)).collect(),
    }
}

fn market_info(ticker: &Ticker, close_ts: i64, lip_target: u32) -> MarketInfo {
    MarketInfo {
        ticker: ticker.clone(),
        close_ts,
        lip_target,
        yes_bid: None,
        no_bid: None,
        toxic: false,
    }
}

/// Feed a book snapshot straight into the tracked registry, the way the
/// stream worker would on subscription.
fn seed_book(app: &Application, ticker: &Ticker, snap: &BookSnapshot) {
    let registry = app.registry();
    let handle = registry.get(ticker).expect("market must be tracked");
    let mut book = handle.lock();
    book.apply_snapshot(ContractSide::Yes, &snap.yes_bids, 1);
    book.apply_snapshot(ContractSide::No, &snap.no_bids, 1);
}

fn fill(ticker: &Ticker, order: &str, side: OrderSide, cents: i64, count: u32, index: u64) -> FillEvent {
    FillEvent {
        ticker: ticker.clone(),
        order_id: OrderId(order.to_string()),
        side,
        price: Price::from_cents(cents),
        count,
        ts: NOW,
        fill_index: index,
    }
}

fn new_app(config: AppConfig) -> (Application, Arc<SimExchange>) {
    let sim = Arc::new(SimExchange::new());
    let app = Application::new(config, sim.clone());
    (app, sim)
}

#[tokio::test]
async fn scenario_zero_spread_is_blocked_without_orders() {
    let (mut app, sim) = new_app(AppConfig::default());
    let ticker = Ticker::from("M1");

    app.track_market(ticker.clone(), NOW + 86_400, 100);
    // yes bid 0.45; no bid 0.55 synthesizes a 0.45 ask: zero spread.
    seed_book(
        &app,
        &ticker,
        &snapshot(&[(45, 80), (44, 200)], &[(55, 80), (54, 200)]),
    );

    app.tick(NOW).await;

    assert!(sim.placed_orders().is_empty());
    assert_eq!(app.market_phase(&ticker), Some(MarketPhase::Blocked));
    assert!(app.is_tracked(&ticker));
}

#[tokio::test]
async fn scenario_lip_target_met_untracks_flat_market() {
    let (mut app, sim) = new_app(AppConfig::default());
    let ticker = Ticker::from("M2");

    app.track_market(ticker.clone(), NOW + 86_400, 100);
    // 500 contracts already rest at best: nothing for us to add.
    seed_book(&app, &ticker, &snapshot(&[(30, 500)], &[(65, 300)]));

    app.tick(NOW).await;

    assert!(sim.placed_orders().is_empty());
    assert!(!app.is_tracked(&ticker));
}

#[tokio::test]
async fn scenario_admission_risk_gate() {
    let (mut app, _sim) = new_app(AppConfig::default());
    let near = Ticker::from("M3");
    let very_near = Ticker::from("M3-LATE");

    // One market near the top of the vol distribution, one at the top.
    let mut entries = HashMap::new();
    entries.insert(
        near.clone(),
        VolEntry {
            sigma: 0.2,
            percentile: Some(0.9),
        },
    );
    entries.insert(
        very_near.clone(),
        VolEntry {
            sigma: 0.4,
            percentile: Some(1.0),
        },
    );
    app.vol_cache().swap(Arc::new(VolSnapshot { entries: entries.clone() }));

    // 15 minutes out with percentile 0.9: risk ≈ 2.70 < 3.0 → admitted.
    app.candidate_queue().push(lip_bot::discovery::Candidate {
        ticker: near.clone(),
        close_ts: NOW + 900,
        lip_target: 100,
    });
    // 1 minute out with percentile 1.0: risk ≈ 2.993 → still admitted.
    app.candidate_queue().push(lip_bot::discovery::Candidate {
        ticker: very_near.clone(),
        close_ts: NOW + 60,
        lip_target: 100,
    });
    app.tick(NOW).await;

    assert!(app.is_tracked(&near));
    assert!(app.is_tracked(&very_near));

    // With a tighter threshold the same market is rejected.
    let mut config = AppConfig::default();
    config.maker.lip_risk_threshold = 2.5;
    let (mut strict, _sim) = new_app(config);
    strict.vol_cache().swap(Arc::new(VolSnapshot { entries }));
    strict.candidate_queue().push(lip_bot::discovery::Candidate {
        ticker: near.clone(),
        close_ts: NOW + 900,
        lip_target: 100,
    });
    strict.tick(NOW).await;
    assert!(!strict.is_tracked(&near));
}

#[tokio::test]
async fn scenario_resolved_market_cashes_out_and_untracks() {
    let (mut app, sim) = new_app(AppConfig::default());
    let ticker = Ticker::from("M4");

    sim.add_market(
        market_info(&ticker, NOW + 86_400, 100),
        snapshot(&[(99, 50)], &[(1, 200)]),
    );
    app.track_market(ticker.clone(), NOW + 86_400, 100);
    seed_book(&app, &ticker, &snapshot(&[(99, 50)], &[(1, 200)]));

    // Long 80 from an earlier session.
    app.fill_sender()
        .send(fill(&ticker, "seed", OrderSide::Buy, 45, 80, 1))
        .await
        .unwrap();

    app.tick(NOW).await;

    // One IOC sell for the full position at the 0.99 bid.
    let placed = sim.placed_orders();
    assert_eq!(placed.len(), 1);
    let (cashout_id, req) = &placed[0];
    assert_eq!(req.side, OrderSide::Sell);
    assert_eq!(req.price, Price::from_cents(99));
    assert_eq!(req.count, 80);
    assert_eq!(req.tif, TimeInForce::Ioc);
    assert_eq!(app.market_phase(&ticker), Some(MarketPhase::Exiting));

    // The cash-out fills; the market untracks once flat.
    app.fill_sender()
        .send(fill(&ticker, &cashout_id.0, OrderSide::Sell, 99, 80, 1))
        .await
        .unwrap();
    app.tick(NOW + 1).await;

    assert_eq!(app.position(&ticker), 0);
    assert!(!app.is_tracked(&ticker));
}

#[tokio::test]
async fn scenario_reactive_ask_follows_best_bid() {
    let (mut app, sim) = new_app(AppConfig::default());
    let ticker = Ticker::from("M5");

    app.track_market(ticker.clone(), NOW + 3 * 86_400, 100);
    seed_book(
        &app,
        &ticker,
        &snapshot(&[(50, 80), (49, 200)], &[(48, 80), (47, 200)]),
    );

    // Holding +10 going into the tick.
    app.fill_sender()
        .send(fill(&ticker, "seed", OrderSide::Buy, 50, 10, 1))
        .await
        .unwrap();

    app.tick(NOW).await;
    let placed = sim.placed_orders();
    // Both sides quoted; the live sell is the reactive reference.
    let sell = placed
        .iter()
        .find(|(_, r)| r.side == OrderSide::Sell)
        .expect("a sell quote rests");
    assert_eq!(sell.1.price, Price::from_cents(52));

    // Best bid lifts to 0.53: the sell is replaced at the new reference.
    app.on_touch_update(TouchUpdate {
        ticker: ticker.clone(),
        best_bid: Price::from_cents(53),
    })
    .await;

    let placed = sim.placed_orders();
    let last = placed.last().unwrap();
    assert_eq!(last.1.side, OrderSide::Sell);
    assert_eq!(last.1.price, Price::from_cents(53));
    assert_eq!(last.1.count, 10);
    assert!(sim.canceled_orders().contains(&sell.0));

    // A second update inside the 500 ms cooldown is skipped.
    let count_before = placed.len();
    app.on_touch_update(TouchUpdate {
        ticker: ticker.clone(),
        best_bid: Price::from_cents(54),
    })
    .await;
    assert_eq!(sim.placed_orders().len(), count_before);
}

#[tokio::test]
async fn scenario_consecutive_errors_trip_breaker() {
    let mut config = AppConfig::default();
    config.circuit.max_consecutive_errors = 10;
    let (mut app, sim) = new_app(config);
    let ticker = Ticker::from("M6");

    app.track_market(ticker.clone(), NOW + 3 * 86_400, 100);
    seed_book(
        &app,
        &ticker,
        &snapshot(&[(45, 80), (44, 200)], &[(53, 80), (52, 200)]),
    );

    // Ten consecutive placement timeouts; each tick attempts two sides.
    for _ in 0..10 {
        sim.fail_next_place(ExchangeError::TransportTimeout);
    }
    for i in 0..5 {
        app.tick(NOW + i).await;
    }
    assert!(app.breaker().is_tripped());

    // After the trip, further ticks never issue a placement: the queued
    // errors are exhausted, so any attempt would now succeed and show up.
    for i in 5..8 {
        app.tick(NOW + i).await;
    }
    assert!(sim.placed_orders().is_empty());
}
