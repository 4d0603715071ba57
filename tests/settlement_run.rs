//! End-to-end coverage of the weekly settlement run.
//!
//! Scenarios drive the public service facade the way the admin portal does:
//! import platform batches, run the week, then inspect settlements and the
//! run report without reaching into private modules.

mod common {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::NaiveDateTime;

    use fleet_settle::settlement::{
        AdminFeeRule, Cents, DriverId, DriverIdentity, DriverType, FeeConfig, FinancingAgreement,
        FinancingKind, FinancingStatus, MemoryFleetDirectory, MemorySettlementStore, Platform,
        RawRecord, RecordKind, ReferralLink, RuleSet, SettlementService, StaticRuleProvider,
        WeekId,
    };

    pub(super) type Service =
        SettlementService<MemorySettlementStore, MemoryFleetDirectory, StaticRuleProvider>;

    pub(super) fn week() -> WeekId {
        WeekId::new(2025, 30).expect("valid week")
    }

    pub(super) fn onboarding_week() -> WeekId {
        WeekId::new(2025, 1).expect("valid week")
    }

    pub(super) fn stamp(week: WeekId) -> NaiveDateTime {
        week.start().and_hms_opt(10, 0, 0).expect("valid time")
    }

    pub(super) fn renter(id: &str) -> DriverIdentity {
        DriverIdentity {
            id: DriverId(id.to_string()),
            display_name: format!("Driver {id}"),
            driver_type: DriverType::Renter,
            uber_account_ids: vec![format!("uber-{id}")],
            bolt_account_ids: vec![format!("{id}@fleet.pt")],
            fuel_card_key: Some(format!("card-{id}")),
            toll_tag_id: Some(format!("tag-{id}")),
            vehicle_plate: Some(format!("AA-{id}-BB")),
            admin_fee_override: None,
            weekly_rental_fee: Some(10_000),
            active: true,
            onboarded_week: onboarding_week(),
        }
    }

    pub(super) fn affiliate(id: &str) -> DriverIdentity {
        DriverIdentity {
            id: DriverId(id.to_string()),
            display_name: format!("Driver {id}"),
            driver_type: DriverType::Affiliate,
            uber_account_ids: vec![format!("uber-{id}")],
            bolt_account_ids: vec![format!("{id}@fleet.pt")],
            fuel_card_key: None,
            toll_tag_id: None,
            vehicle_plate: None,
            admin_fee_override: None,
            weekly_rental_fee: None,
            active: true,
            onboarded_week: onboarding_week(),
        }
    }

    pub(super) fn raw(
        platform: Platform,
        reference: &str,
        kind: RecordKind,
        amount: Cents,
    ) -> RawRecord {
        RawRecord {
            platform,
            reference: reference.to_string(),
            secondary_reference: None,
            amount,
            kind,
            occurred_at: stamp(week()),
        }
    }

    pub(super) fn referral(recruiter: &str, recruit: &str) -> ReferralLink {
        ReferralLink {
            recruiter: DriverId(recruiter.to_string()),
            recruit: DriverId(recruit.to_string()),
            accepted_week: onboarding_week(),
            active: true,
        }
    }

    pub(super) fn loan(driver: &str, principal: Cents, total_weeks: u32) -> FinancingAgreement {
        FinancingAgreement {
            driver: DriverId(driver.to_string()),
            kind: FinancingKind::Loan {
                principal,
                total_weeks,
            },
            weekly_interest: 100,
            status: FinancingStatus::Active,
            remaining_weeks: total_weeks,
            applied_weeks: BTreeSet::new(),
        }
    }

    pub(super) fn build_service(
        rules: RuleSet,
    ) -> (Arc<Service>, Arc<MemoryFleetDirectory>, Arc<MemorySettlementStore>) {
        let store = Arc::new(MemorySettlementStore::default());
        let directory = Arc::new(MemoryFleetDirectory::default());
        let provider = Arc::new(StaticRuleProvider::new(rules));
        let service = Arc::new(SettlementService::new(
            store.clone(),
            directory.clone(),
            provider,
        ));
        (service, directory, store)
    }

    pub(super) fn default_rules() -> RuleSet {
        RuleSet {
            fees: FeeConfig::default(),
            ..RuleSet::default()
        }
    }

    /// One renter driver with EUR 1000.00 in trips, EUR 50.00 fuel, and
    /// EUR 20.00 tolls imported across all four platforms.
    pub(super) fn import_worked_example(service: &Service, driver: &DriverIdentity) {
        let id = &driver.id.0;
        service
            .import_batch(
                Platform::Uber,
                week(),
                &[
                    raw(
                        Platform::Uber,
                        &format!("uber-{id}"),
                        RecordKind::TripRevenue,
                        40_000,
                    ),
                    raw(
                        Platform::Uber,
                        &format!("uber-{id}"),
                        RecordKind::TripRevenue,
                        35_000,
                    ),
                ],
            )
            .expect("uber import");
        service
            .import_batch(
                Platform::Bolt,
                week(),
                &[raw(
                    Platform::Bolt,
                    &format!("{id}@fleet.pt"),
                    RecordKind::TripRevenue,
                    25_000,
                )],
            )
            .expect("bolt import");
        service
            .import_batch(
                Platform::MyPrio,
                week(),
                &[raw(
                    Platform::MyPrio,
                    &format!("card-{id}"),
                    RecordKind::FuelCharge,
                    5_000,
                )],
            )
            .expect("fuel import");
        service
            .import_batch(
                Platform::ViaVerde,
                week(),
                &[raw(
                    Platform::ViaVerde,
                    &format!("tag-{id}"),
                    RecordKind::Toll,
                    2_000,
                )],
            )
            .expect("toll import");
    }

    pub(super) fn with_override(mut driver: DriverIdentity, rule: AdminFeeRule) -> DriverIdentity {
        driver.admin_fee_override = Some(rule);
        driver
    }
}

mod arithmetic {
    use super::common::*;
    use fleet_settle::settlement::{AdminFeeRule, DriverId, FeeRuleApplied, Platform};

    #[test]
    fn worked_example_produces_the_contractual_breakdown() {
        let (service, directory, _) = build_service(default_rules());
        let driver = renter("ana");
        directory.upsert_driver(driver.clone());
        import_worked_example(&service, &driver);

        let report = service.run_week(week()).expect("run succeeds");
        assert_eq!(report.processed, 1);
        assert_eq!(report.unreconciled_total, 0);
        assert!(report.complete);

        let settlement = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement stored");
        let breakdown = settlement.breakdown();

        assert_eq!(breakdown.gross_revenue, 100_000);
        assert_eq!(breakdown.trip_count, 3);
        assert_eq!(breakdown.revenue_by_platform[&Platform::Uber], 75_000);
        assert_eq!(breakdown.revenue_by_platform[&Platform::Bolt], 25_000);
        // 100000 / 1.06 rounds to 94340; VAT is the remainder so the pair
        // always sums back to gross.
        assert_eq!(breakdown.gross_minus_vat, 94_340);
        assert_eq!(breakdown.vat_amount, 5_660);
        assert_eq!(breakdown.vat_amount + breakdown.gross_minus_vat, 100_000);
        // Renter default: 4% of gross-minus-VAT.
        assert_eq!(breakdown.admin_fee, 3_774);
        assert_eq!(breakdown.fee_rule, FeeRuleApplied::TypeDefault);
        assert_eq!(breakdown.fuel, 5_000);
        assert_eq!(breakdown.tolls, 2_000);
        assert_eq!(breakdown.rental_fee, 10_000);
        assert_eq!(breakdown.net_payout, 73_566);
        assert!(!breakdown.negative_net);
    }

    #[test]
    fn personal_override_beats_type_default() {
        let (service, directory, _) = build_service(default_rules());
        let driver = with_override(renter("ana"), AdminFeeRule::Fixed(1_000));
        directory.upsert_driver(driver.clone());
        import_worked_example(&service, &driver);

        service.run_week(week()).expect("run succeeds");
        let settlement = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement stored");

        assert_eq!(settlement.breakdown().admin_fee, 1_000);
        assert_eq!(settlement.breakdown().fee_rule, FeeRuleApplied::PersonalFixed);
    }

    #[test]
    fn affiliate_pays_fixed_default_and_no_rental() {
        let (service, directory, _) = build_service(default_rules());
        let driver = affiliate("rui");
        directory.upsert_driver(driver.clone());
        service
            .import_batch(
                Platform::Uber,
                week(),
                &[raw(
                    Platform::Uber,
                    "uber-rui",
                    fleet_settle::settlement::RecordKind::TripRevenue,
                    100_000,
                )],
            )
            .expect("import");

        service.run_week(week()).expect("run succeeds");
        let settlement = service
            .settlement(&DriverId("rui".to_string()), week())
            .expect("settlement stored");

        assert_eq!(settlement.breakdown().admin_fee, 2_500);
        assert_eq!(settlement.breakdown().rental_fee, 0);
        assert_eq!(settlement.breakdown().net_payout, 94_340 - 2_500);
    }

    #[test]
    fn negative_net_is_flagged_not_clamped() {
        let (service, directory, _) = build_service(default_rules());
        let driver = renter("ana");
        directory.upsert_driver(driver.clone());
        service
            .import_batch(
                fleet_settle::settlement::Platform::Uber,
                week(),
                &[raw(
                    fleet_settle::settlement::Platform::Uber,
                    "uber-ana",
                    fleet_settle::settlement::RecordKind::TripRevenue,
                    5_000,
                )],
            )
            .expect("import");

        service.run_week(week()).expect("run succeeds");
        let settlement = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement stored");

        assert!(settlement.breakdown().net_payout < 0);
        assert!(settlement.breakdown().negative_net);
    }
}

mod reconciliation {
    use super::common::*;
    use fleet_settle::settlement::{Platform, RecordKind};

    #[test]
    fn unknown_references_stay_unreconciled() {
        let (service, directory, _) = build_service(default_rules());
        let driver = renter("ana");
        directory.upsert_driver(driver.clone());
        import_worked_example(&service, &driver);

        let summary = service
            .import_batch(
                Platform::Uber,
                week(),
                &[
                    raw(Platform::Uber, "uber-ana", RecordKind::TripRevenue, 40_000),
                    raw(Platform::Uber, "999999", RecordKind::TripRevenue, 12_345),
                ],
            )
            .expect("reimport");
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.unmapped, 1);

        let report = service.run_week(week()).expect("run succeeds");
        assert_eq!(report.unreconciled_total, 12_345);
        assert_eq!(report.unreconciled[&Platform::Uber], 12_345);
        assert!(!report.complete);
    }

    #[test]
    fn reimport_replaces_the_platform_batch() {
        let (service, directory, _) = build_service(default_rules());
        let driver = renter("ana");
        directory.upsert_driver(driver.clone());
        import_worked_example(&service, &driver);

        // Corrected Uber statement arrives; only the Uber batch changes.
        service
            .import_batch(
                Platform::Uber,
                week(),
                &[raw(Platform::Uber, "uber-ana", RecordKind::TripRevenue, 60_000)],
            )
            .expect("reimport");

        service.run_week(week()).expect("run succeeds");
        let settlement = service
            .settlement(&fleet_settle::settlement::DriverId("ana".to_string()), week())
            .expect("settlement stored");
        assert_eq!(settlement.breakdown().gross_revenue, 85_000);
        assert_eq!(settlement.breakdown().revenue_by_platform[&Platform::Uber], 60_000);
        assert_eq!(settlement.breakdown().revenue_by_platform[&Platform::Bolt], 25_000);
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let (service, directory, _) = build_service(default_rules());
        directory.upsert_driver(renter("ana"));

        let mut stale = raw(Platform::Uber, "uber-ana", RecordKind::TripRevenue, 40_000);
        stale.occurred_at = week()
            .next()
            .start()
            .and_hms_opt(0, 30, 0)
            .expect("valid time");

        let summary = service
            .import_batch(
                Platform::Uber,
                week(),
                &[
                    raw(Platform::Uber, "uber-ana", RecordKind::TripRevenue, 40_000),
                    raw(Platform::Uber, "", RecordKind::TripRevenue, 10_000),
                    raw(Platform::Uber, "uber-ana", RecordKind::TripRevenue, -5_000),
                    stale,
                ],
            )
            .expect("import");

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 3);
    }
}

mod recompute {
    use super::common::*;
    use fleet_settle::settlement::DriverId;

    #[test]
    fn rerunning_an_unchanged_week_is_idempotent() {
        let (service, directory, _) = build_service(default_rules());
        let driver = renter("ana");
        directory.upsert_driver(driver.clone());
        import_worked_example(&service, &driver);

        service.run_week(week()).expect("first run");
        let first = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement");

        let report = service.run_week(week()).expect("second run");
        assert_eq!(report.processed, 1);

        let second = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement");
        assert_eq!(first.breakdown(), second.breakdown());
        assert!(second.version() > first.version());
    }

    #[test]
    fn single_driver_recompute_leaves_others_untouched() {
        let (service, directory, _) = build_service(default_rules());
        let ana = renter("ana");
        let rui = affiliate("rui");
        directory.upsert_driver(ana.clone());
        directory.upsert_driver(rui.clone());
        import_worked_example(&service, &ana);
        service
            .import_batch(
                fleet_settle::settlement::Platform::Bolt,
                week(),
                &[
                    raw(
                        fleet_settle::settlement::Platform::Bolt,
                        "ana@fleet.pt",
                        fleet_settle::settlement::RecordKind::TripRevenue,
                        25_000,
                    ),
                    raw(
                        fleet_settle::settlement::Platform::Bolt,
                        "rui@fleet.pt",
                        fleet_settle::settlement::RecordKind::TripRevenue,
                        50_000,
                    ),
                ],
            )
            .expect("import");

        service.run_week(week()).expect("initial run");
        let rui_before = service
            .settlement(&DriverId("rui".to_string()), week())
            .expect("settlement");

        service
            .recompute(week(), Some(DriverId("ana".to_string())))
            .expect("targeted recompute");

        let rui_after = service
            .settlement(&DriverId("rui".to_string()), week())
            .expect("settlement");
        assert_eq!(rui_before.version(), rui_after.version());
    }

    #[test]
    fn recompute_of_unknown_driver_is_not_found() {
        let (service, directory, _) = build_service(default_rules());
        directory.upsert_driver(renter("ana"));

        let result = service.recompute(week(), Some(DriverId("ghost".to_string())));
        assert!(matches!(
            result,
            Err(fleet_settle::settlement::SettlementError::NotFound { .. })
        ));
    }
}

mod commissions {
    use super::common::*;
    use fleet_settle::settlement::{
        DriverId, GoalCriterion, GoalReward, GoalRule, Platform, RecordKind,
    };

    /// Imports replace the whole (platform, week) batch, so the Bolt batch
    /// carries every driver's rows at once: Ana's worked-example 250.00 plus
    /// the listed extras.
    fn import_bolt_with_ana(service: &Service, extras: &[(&str, i64)]) {
        let mut rows = vec![raw(
            Platform::Bolt,
            "ana@fleet.pt",
            RecordKind::TripRevenue,
            25_000,
        )];
        for (email, amount) in extras {
            rows.push(raw(Platform::Bolt, email, RecordKind::TripRevenue, *amount));
        }
        service
            .import_batch(Platform::Bolt, week(), &rows)
            .expect("bolt import");
    }

    #[test]
    fn recruiter_earns_level_one_commission_on_recruit_base_net() {
        let (service, directory, _) = build_service(default_rules());
        let ana = renter("ana");
        let rui = affiliate("rui");
        directory.upsert_driver(ana.clone());
        directory.upsert_driver(rui.clone());
        directory.add_referral(referral("rui", "ana"));
        import_worked_example(&service, &ana);
        // Recruiter revenue stays above the eligibility floor.
        import_bolt_with_ana(&service, &[("rui@fleet.pt", 50_000)]);

        service.run_week(week()).expect("run succeeds");

        let rui_settlement = service
            .settlement(&DriverId("rui".to_string()), week())
            .expect("settlement");
        // 5% of the recruit's base net payout of 73566.
        assert_eq!(rui_settlement.breakdown().referral_commission, 3_678);

        let ana_settlement = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement");
        assert_eq!(ana_settlement.breakdown().referral_commission, 0);
        assert_eq!(ana_settlement.breakdown().net_payout, 73_566);
    }

    #[test]
    fn ineligible_middle_link_does_not_block_the_level_above() {
        let (service, directory, _) = build_service(default_rules());
        let ana = renter("ana");
        let rui = affiliate("rui");
        let eva = affiliate("eva");
        directory.upsert_driver(ana.clone());
        directory.upsert_driver(rui.clone());
        directory.upsert_driver(eva.clone());
        // eva recruited rui, rui recruited ana.
        directory.add_referral(referral("eva", "rui"));
        directory.add_referral(referral("rui", "ana"));
        import_worked_example(&service, &ana);
        // rui sits below the revenue floor, eva well above it.
        import_bolt_with_ana(&service, &[("rui@fleet.pt", 10_000), ("eva@fleet.pt", 60_000)]);

        service.run_week(week()).expect("run succeeds");

        let rui_settlement = service
            .settlement(&DriverId("rui".to_string()), week())
            .expect("settlement");
        assert_eq!(rui_settlement.breakdown().referral_commission, 0);

        // eva still earns the level-2 rate on ana's base net.
        let eva_settlement = service
            .settlement(&DriverId("eva".to_string()), week())
            .expect("settlement");
        assert_eq!(
            eva_settlement.breakdown().referral_commission,
            (73_566f64 * 0.03).round() as i64
        );
    }

    #[test]
    fn fresh_recruits_pay_no_commission_upward() {
        let (service, directory, _) = build_service(default_rules());
        let mut ana = renter("ana");
        ana.onboarded_week = week(); // joined this week
        let rui = affiliate("rui");
        directory.upsert_driver(ana.clone());
        directory.upsert_driver(rui.clone());
        directory.add_referral(referral("rui", "ana"));
        import_worked_example(&service, &ana);
        import_bolt_with_ana(&service, &[("rui@fleet.pt", 50_000)]);

        service.run_week(week()).expect("run succeeds");

        let rui_settlement = service
            .settlement(&DriverId("rui".to_string()), week())
            .expect("settlement");
        assert_eq!(rui_settlement.breakdown().referral_commission, 0);
    }

    #[test]
    fn paying_the_recruit_keeps_the_recruiters_commission_on_rerun() {
        let (service, directory, _) = build_service(default_rules());
        let ana = renter("ana");
        let rui = affiliate("rui");
        directory.upsert_driver(ana.clone());
        directory.upsert_driver(rui.clone());
        directory.add_referral(referral("rui", "ana"));
        import_worked_example(&service, &ana);
        import_bolt_with_ana(&service, &[("rui@fleet.pt", 50_000)]);

        service.run_week(week()).expect("first run");
        let before = service
            .settlement(&DriverId("rui".to_string()), week())
            .expect("settlement");
        assert_eq!(before.breakdown().referral_commission, 3_678);

        service
            .mark_paid(
                &DriverId("ana".to_string()),
                week(),
                week().end(),
                "transfer-0042".to_string(),
            )
            .expect("mark paid");

        // Ana is frozen now, but her base still anchors rui's commission.
        let report = service.run_week(week()).expect("rerun");
        assert_eq!(report.frozen_skipped, 1);

        let after = service
            .settlement(&DriverId("rui".to_string()), week())
            .expect("settlement");
        assert_eq!(after.breakdown(), before.breakdown());
        assert_eq!(after.breakdown().referral_commission, 3_678);
    }

    #[test]
    fn highest_priority_goal_wins_outright() {
        let mut rules = default_rules();
        rules.goals = vec![
            GoalRule {
                id: 1,
                criterion: GoalCriterion::Revenue { min: 50_000 },
                reward: GoalReward::Fixed(2_000),
                priority: 1,
                active: true,
            },
            GoalRule {
                id: 2,
                criterion: GoalCriterion::Trips { min: 2 },
                reward: GoalReward::Fixed(10_000),
                priority: 5,
                active: true,
            },
        ];
        let (service, directory, _) = build_service(rules);
        let ana = renter("ana");
        directory.upsert_driver(ana.clone());
        import_worked_example(&service, &ana);

        service.run_week(week()).expect("run succeeds");

        let settlement = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement");
        // Both rules qualify; only the priority-5 reward lands.
        assert_eq!(settlement.breakdown().goal_bonus, 10_000);
        assert_eq!(settlement.breakdown().net_payout, 73_566 + 10_000);
    }

    #[test]
    fn commission_base_excludes_goal_bonuses() {
        let mut rules = default_rules();
        rules.goals = vec![GoalRule {
            id: 1,
            criterion: GoalCriterion::Revenue { min: 50_000 },
            reward: GoalReward::Fixed(10_000),
            priority: 1,
            active: true,
        }];
        let (service, directory, _) = build_service(rules);
        let ana = renter("ana");
        let rui = affiliate("rui");
        directory.upsert_driver(ana.clone());
        directory.upsert_driver(rui.clone());
        directory.add_referral(referral("rui", "ana"));
        import_worked_example(&service, &ana);
        import_bolt_with_ana(&service, &[("rui@fleet.pt", 60_000)]);

        service.run_week(week()).expect("run succeeds");

        // Ana's bonus lands on her own payout but never inflates the base
        // her recruiter's commission is computed from.
        let rui_settlement = service
            .settlement(&DriverId("rui".to_string()), week())
            .expect("settlement");
        assert_eq!(rui_settlement.breakdown().referral_commission, 3_678);
    }
}

mod reporting {
    use std::sync::Arc;

    use super::common::*;
    use fleet_settle::settlement::{SettlementService, StaticRuleProvider};

    #[test]
    fn restarted_engine_reports_partial_summaries_only() {
        let (service, directory, store) = build_service(default_rules());
        let driver = renter("ana");
        directory.upsert_driver(driver.clone());
        import_worked_example(&service, &driver);

        let run = service.run_week(week()).expect("run succeeds");
        assert!(run.complete);
        assert!(service.weekly_report(week()).expect("cached report").complete);

        // A fresh engine over the same store has no run history to vouch
        // for the week; its summary never claims completeness.
        let restarted = SettlementService::new(
            store,
            directory,
            Arc::new(StaticRuleProvider::new(default_rules())),
        );
        let report = restarted.weekly_report(week()).expect("fallback report");
        assert_eq!(report.processed, 1);
        assert_eq!(report.unreconciled_total, 0);
        assert!(!report.complete);
    }
}

mod routing {
    use super::common::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;

    use fleet_settle::settlement::settlement_router;
    use tower::ServiceExt;

    async fn settled_router() -> (axum::Router, Arc<Service>) {
        let (service, directory, _) = build_service(default_rules());
        let driver = renter("ana");
        directory.upsert_driver(driver.clone());
        import_worked_example(&service, &driver);
        service.run_week(week()).expect("run succeeds");
        (settlement_router(service.clone()), service)
    }

    #[tokio::test]
    async fn week_listing_returns_settlement_views() {
        let (router, _) = settled_router().await;

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/settlements/2025-W30")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        let rows = payload.as_array().expect("array of views");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("driver"), Some(&json!("ana")));
        assert_eq!(rows[0].get("net_payout").and_then(Value::as_i64), Some(73_566));
        assert_eq!(rows[0].get("status"), Some(&json!("pending")));
    }

    #[tokio::test]
    async fn malformed_week_is_a_bad_request() {
        let (router, _) = settled_router().await;

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/settlements/week-thirty")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_driver_detail_is_not_found() {
        let (router, _) = settled_router().await;

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/settlements/2025-W30/ghost")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn paying_over_http_freezes_and_conflicts_on_retry() {
        let (router, _) = settled_router().await;
        let pay = || {
            Request::builder()
                .method("POST")
                .uri("/api/v1/settlements/2025-W30/ana/pay")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "proof_reference": "transfer-0042",
                        "paid_on": "2025-07-27",
                    }))
                    .expect("serialize"),
                ))
                .expect("request")
        };

        let response = router.clone().oneshot(pay()).await.expect("dispatch");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload.get("status"), Some(&json!("paid")));
        assert_eq!(payload.get("paid_on"), Some(&json!("2025-07-27")));

        let retry = router.clone().oneshot(pay()).await.expect("dispatch");
        assert_eq!(retry.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn csv_export_carries_the_breakdown() {
        let (router, _) = settled_router().await;

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/settlements/2025-W30/export")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|value| value.to_str().ok()),
            Some("text/csv; charset=utf-8")
        );
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let csv = String::from_utf8(body.to_vec()).expect("utf8 csv");
        assert!(csv.contains("ana"));
        assert!(csv.contains("73566"));
    }

    #[tokio::test]
    async fn recompute_endpoint_returns_the_run_report() {
        let (router, _) = settled_router().await;

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/settlements/2025-W30/recompute")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&json!({ "driver_id": "ana" })).expect("serialize"),
                    ))
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload.get("processed").and_then(Value::as_i64), Some(1));
        assert_eq!(payload.get("complete"), Some(&json!(true)));
    }
}

mod financing {
    use super::common::*;
    use fleet_settle::settlement::{DriverId, FinancingStatus, Platform, RawRecord, RecordKind};

    #[test]
    fn loan_deduction_counts_down_on_successful_runs_only() {
        let (service, directory, _) = build_service(default_rules());
        let ana = renter("ana");
        directory.upsert_driver(ana.clone());
        directory.add_financing(loan("ana", 52_000, 52));
        import_worked_example(&service, &ana);

        service.run_week(week()).expect("run succeeds");

        let settlement = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement");
        // 52000 / 52 weeks plus 100 weekly interest.
        assert_eq!(settlement.breakdown().financing_deduction, 1_100);

        let agreements = directory.financing_for(&DriverId("ana".to_string()));
        assert_eq!(agreements.len(), 1);
        assert_eq!(agreements[0].remaining_weeks, 51);
        assert_eq!(agreements[0].status, FinancingStatus::Active);
    }

    #[test]
    fn rerunning_one_week_amortizes_it_once() {
        let (service, directory, _) = build_service(default_rules());
        let ana = renter("ana");
        directory.upsert_driver(ana.clone());
        directory.add_financing(loan("ana", 6_000, 3));
        import_worked_example(&service, &ana);

        service.run_week(week()).expect("first run");
        let first = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement");
        assert_eq!(first.breakdown().financing_deduction, 2_100);

        service.run_week(week()).expect("second run");
        service.run_week(week()).expect("third run");

        // One settled week, one installment, whatever the run count.
        let agreements = directory.financing_for(&DriverId("ana".to_string()));
        assert_eq!(agreements[0].remaining_weeks, 2);
        assert_eq!(agreements[0].status, FinancingStatus::Active);

        let last = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement");
        assert_eq!(last.breakdown(), first.breakdown());
    }

    #[test]
    fn final_installment_completes_the_loan() {
        let (service, directory, _) = build_service(default_rules());
        let ana = renter("ana");
        directory.upsert_driver(ana.clone());
        let mut agreement = loan("ana", 52_000, 52);
        agreement.remaining_weeks = 1;
        directory.add_financing(agreement);
        import_worked_example(&service, &ana);

        service.run_week(week()).expect("run succeeds");

        let agreements = directory.financing_for(&DriverId("ana".to_string()));
        assert_eq!(agreements[0].remaining_weeks, 0);
        assert_eq!(agreements[0].status, FinancingStatus::Completed);

        // Recomputing the settled week keeps its final installment intact.
        service.run_week(week()).expect("rerun");
        let settlement = service
            .settlement(&DriverId("ana".to_string()), week())
            .expect("settlement");
        assert_eq!(settlement.breakdown().financing_deduction, 1_100);

        // The following week owes nothing on the completed loan.
        let next_week = week().next();
        service
            .import_batch(
                Platform::Uber,
                next_week,
                &[RawRecord {
                    platform: Platform::Uber,
                    reference: "uber-ana".to_string(),
                    secondary_reference: None,
                    amount: 100_000,
                    kind: RecordKind::TripRevenue,
                    occurred_at: stamp(next_week),
                }],
            )
            .expect("next week import");
        service.run_week(next_week).expect("next week run");
        let following = service
            .settlement(&DriverId("ana".to_string()), next_week)
            .expect("settlement");
        assert_eq!(following.breakdown().financing_deduction, 0);
    }
}
