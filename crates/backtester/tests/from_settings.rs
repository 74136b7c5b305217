use backtester::{Broker, NavRecorder, ScheduledOrders};
use configuration::load_config_from_str;
use core_types::Currency;
use rust_decimal_macros::dec;

const SETTINGS: &str = r#"
    [broker]
    default_numeraire = "EUR"

    [[accounts]]
    currency = "EUR"
    initial_amount = "1000"

    [[accounts]]
    currency = "USD"

    [[filters]]
    kind = "proportional"
    name = "commission"
    rate = "0.01"

    [[quotes]]
    base = "EUR"
    quote = "USD"
    series = [
        { time = "2021-07-01T00:00:00Z", bid = "1.25", ask = "1.25" },
        { time = "2021-07-02T00:00:00Z", bid = "1.25", ask = "1.25" },
    ]

    [[orders]]
    time = "2021-07-01T00:00:00Z"
    order = { kind = "convert", from = "EUR", to = "USD", amount = "100" }
"#;

#[test]
fn configured_run_applies_orders_and_costs() {
    let settings = load_config_from_str(SETTINGS).unwrap();
    let mut broker = Broker::from_settings(&settings).unwrap();
    let mut strategy = ScheduledOrders::from_settings(&settings.orders).unwrap();
    let mut recorder = NavRecorder::new();

    let summary = broker
        .run(&mut strategy, &mut recorder, settings.broker.start_time, settings.broker.max_iterations)
        .unwrap();

    assert_eq!(summary.executed, 1);
    let eur = Currency::new("EUR").unwrap();
    let usd = Currency::new("USD").unwrap();
    // 100 EUR sold, 1 EUR commission.
    assert_eq!(broker.simulator().balance(&eur), Some(dec!(899)));
    assert_eq!(broker.simulator().balance(&usd), Some(dec!(125)));
    assert_eq!(broker.simulator().costs_by_filter()["commission"][&eur], dec!(1));
    assert_eq!(summary.final_nav, Some(dec!(999)));
}
