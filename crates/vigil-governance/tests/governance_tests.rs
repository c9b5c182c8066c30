#[cfg(test)]
mod tests {
    // ── Confidence ─────────────────────────────────────────────

    mod confidence {
        use vigil_core::{Tier, VigilError};
        use vigil_governance::ConfidenceScorer;

        #[test]
        fn test_values_inside_bound_pass_through() {
            let scorer = ConfidenceScorer::default();
            let check = scorer.validate(Tier::Intern, 0.6);
            assert!(check.ok);
            assert_eq!(check.clamped, 0.6);
        }

        #[test]
        fn test_shared_boundary_valid_for_both_tiers() {
            let scorer = ConfidenceScorer::default();
            for (lower, upper, edge) in [
                (Tier::Student, Tier::Intern, 0.5),
                (Tier::Intern, Tier::Supervised, 0.7),
                (Tier::Supervised, Tier::Autonomous, 0.9),
            ] {
                assert!(scorer.validate(lower, edge).ok, "{lower} at {edge}");
                assert!(scorer.validate(upper, edge).ok, "{upper} at {edge}");
            }
        }

        #[test]
        fn test_outside_bound_clamps_to_nearest_endpoint() {
            let scorer = ConfidenceScorer::default();
            let high = scorer.validate(Tier::Intern, 0.95);
            assert!(!high.ok);
            assert_eq!(high.clamped, 0.7);

            let low = scorer.validate(Tier::Autonomous, 0.2);
            assert!(!low.ok);
            assert_eq!(low.clamped, 0.9);

            let negative = scorer.validate(Tier::Student, -0.3);
            assert!(!negative.ok);
            assert_eq!(negative.clamped, 0.0);
        }

        #[test]
        fn test_tier_is_not_inferred_from_confidence() {
            let scorer = ConfidenceScorer::default();
            // 0.95 is a perfectly good Autonomous confidence, but not for a Student.
            assert!(!scorer.validate(Tier::Student, 0.95).ok);
            assert!(scorer.validate(Tier::Autonomous, 0.95).ok);
        }

        #[test]
        fn test_nan_fails_closed() {
            let scorer = ConfidenceScorer::default();
            let check = scorer.validate(Tier::Supervised, f64::NAN);
            assert!(!check.ok);
            assert_eq!(check.clamped, 0.7);
        }

        #[test]
        fn test_ensure_returns_error() {
            let scorer = ConfidenceScorer::default();
            assert_eq!(scorer.ensure(Tier::Student, 0.25).unwrap(), 0.25);
            match scorer.ensure(Tier::Student, 0.8) {
                Err(VigilError::InvalidConfidence { tier, confidence }) => {
                    assert_eq!(tier, Tier::Student);
                    assert_eq!(confidence, 0.8);
                }
                other => panic!("expected InvalidConfidence, got {other:?}"),
            }
        }
    }

    // ── Permission gate ────────────────────────────────────────

    mod permission {
        use chrono::Utc;
        use vigil_config::PermissionConfig;
        use vigil_core::{ActionDescriptor, AgentSnapshot, DecisionReason, Tier};
        use vigil_governance::{PermissionGate, PermissionPolicy};

        fn check(snapshot: &AgentSnapshot, complexity: u8) -> (bool, DecisionReason) {
            let gate = PermissionGate::default();
            let d = gate.check(snapshot, &ActionDescriptor::new("act", complexity), Utc::now());
            (d.allowed, d.reason)
        }

        #[test]
        fn test_intern_denied_supervised_action() {
            let intern = AgentSnapshot::new("a", Tier::Intern, 0.6);
            assert_eq!(check(&intern, 3), (false, DecisionReason::InsufficientTier));
        }

        #[test]
        fn test_tier_meets_minimum() {
            let intern = AgentSnapshot::new("a", Tier::Intern, 0.6);
            assert_eq!(check(&intern, 1), (true, DecisionReason::Ok));
            assert_eq!(check(&intern, 2), (true, DecisionReason::Ok));
            let autonomous = AgentSnapshot::new("a", Tier::Autonomous, 0.95);
            assert_eq!(check(&autonomous, 4), (true, DecisionReason::Ok));
        }

        #[test]
        fn test_unknown_complexity() {
            let autonomous = AgentSnapshot::new("a", Tier::Autonomous, 0.95);
            assert_eq!(check(&autonomous, 0), (false, DecisionReason::UnknownAction));
            assert_eq!(check(&autonomous, 5), (false, DecisionReason::UnknownAction));
            assert_eq!(check(&autonomous, 255), (false, DecisionReason::UnknownAction));
        }

        #[test]
        fn test_rate_equal_to_threshold_is_denied() {
            let at_limit = AgentSnapshot::new("a", Tier::Intern, 0.6).with_intervention_rate(0.5);
            assert_eq!(check(&at_limit, 1), (false, DecisionReason::InterventionRateTooHigh));

            let below = AgentSnapshot::new("a", Tier::Intern, 0.6).with_intervention_rate(0.4999);
            assert_eq!(check(&below, 1), (true, DecisionReason::Ok));

            let supervised =
                AgentSnapshot::new("a", Tier::Supervised, 0.8).with_intervention_rate(0.3);
            assert_eq!(check(&supervised, 2), (false, DecisionReason::InterventionRateTooHigh));
        }

        #[test]
        fn test_tier_check_precedes_rate_check() {
            let snap = AgentSnapshot::new("a", Tier::Intern, 0.6).with_intervention_rate(0.9);
            assert_eq!(check(&snap, 4), (false, DecisionReason::InsufficientTier));
        }

        #[test]
        fn test_student_has_no_rate_ceiling_by_default() {
            let snap = AgentSnapshot::new("a", Tier::Student, 0.3).with_intervention_rate(0.95);
            assert_eq!(check(&snap, 1), (true, DecisionReason::Ok));
        }

        #[test]
        fn test_negative_rate_clamped_and_nan_denied() {
            let negative = AgentSnapshot::new("a", Tier::Intern, 0.6).with_intervention_rate(-0.1);
            assert_eq!(check(&negative, 2), (true, DecisionReason::Ok));

            let nan = AgentSnapshot::new("a", Tier::Student, 0.3).with_intervention_rate(f64::NAN);
            assert_eq!(check(&nan, 1), (false, DecisionReason::InterventionRateTooHigh));
        }

        #[test]
        fn test_custom_table() {
            let mut config = PermissionConfig::default();
            config.complexity.retain(|rule| rule.level != 4);
            config.max_intervention_rate.autonomous = None;
            let gate = PermissionGate::new(config);
            let snap = AgentSnapshot::new("a", Tier::Autonomous, 0.95).with_intervention_rate(0.9);
            let now = Utc::now();
            let d = gate.check(&snap, &ActionDescriptor::new("wipe", 4), now);
            assert_eq!(d.reason, DecisionReason::UnknownAction);
            let d = gate.check(&snap, &ActionDescriptor::new("deploy", 3), now);
            assert!(d.allowed);
            assert_eq!(d.computed_at, now);
        }
    }

    // ── Graduation evaluator ───────────────────────────────────

    mod graduation {
        use chrono::Utc;
        use vigil_core::{AgentSnapshot, GraduationBlocker, GraduationCriteria, Tier};
        use vigil_governance::GraduationEvaluator;

        fn snapshot(episodes: u64, rate: f64, behavior: f64) -> AgentSnapshot {
            AgentSnapshot::new("agent", Tier::Supervised, 0.8)
                .with_episodes(episodes)
                .with_intervention_rate(rate)
                .with_behavior_score(behavior)
        }

        #[test]
        fn test_perfect_agent_scores_100() {
            let criteria = GraduationCriteria::new(50, 0.3);
            let result = GraduationEvaluator::new().evaluate(
                &snapshot(50, 0.0, 1.0),
                Tier::Autonomous,
                &criteria,
                Utc::now(),
            );
            assert_eq!(result.component_scores.episode, 1.0);
            assert_eq!(result.component_scores.intervention, 1.0);
            assert_eq!(result.component_scores.behavior, 1.0);
            assert_eq!(result.readiness_score, 100.0);
            assert!(result.promote);
            assert!(result.blockers.is_empty());
            assert_eq!(result.target_tier, Tier::Autonomous);
            assert_eq!(result.current_tier, Tier::Supervised);
        }

        #[test]
        fn test_negative_rate_never_exceeds_100() {
            let criteria = GraduationCriteria::new(50, 0.3);
            let result = GraduationEvaluator::new().evaluate(
                &snapshot(500, -0.1, 1.0),
                Tier::Autonomous,
                &criteria,
                Utc::now(),
            );
            assert_eq!(result.component_scores.intervention, 1.0);
            assert_eq!(result.readiness_score, 100.0);
        }

        #[test]
        fn test_episode_score_uses_real_division() {
            let criteria = GraduationCriteria::new(50, 0.3);
            let scores =
                GraduationEvaluator::new().component_scores(&snapshot(49, 0.0, 0.0), &criteria);
            assert!((scores.episode - 0.98).abs() < 1e-12);
        }

        #[test]
        fn test_zero_min_episodes_treated_as_one() {
            let criteria = GraduationCriteria::new(0, 0.3);
            let evaluator = GraduationEvaluator::new();
            assert_eq!(evaluator.component_scores(&snapshot(0, 0.0, 0.0), &criteria).episode, 0.0);
            assert_eq!(evaluator.component_scores(&snapshot(1, 0.0, 0.0), &criteria).episode, 1.0);
        }

        #[test]
        fn test_zero_intervention_ceiling() {
            let criteria = GraduationCriteria::new(10, 0.0);
            let evaluator = GraduationEvaluator::new();
            assert_eq!(
                evaluator.component_scores(&snapshot(10, 0.0, 1.0), &criteria).intervention,
                1.0
            );
            assert_eq!(
                evaluator.component_scores(&snapshot(10, 0.01, 1.0), &criteria).intervention,
                0.0
            );
        }

        #[test]
        fn test_rate_above_ceiling_scores_zero() {
            let criteria = GraduationCriteria::new(10, 0.2);
            let scores =
                GraduationEvaluator::new().component_scores(&snapshot(10, 0.6, 1.0), &criteria);
            assert_eq!(scores.intervention, 0.0);
        }

        #[test]
        fn test_weighting() {
            let criteria = GraduationCriteria::new(20, 0.4);
            let result = GraduationEvaluator::new().evaluate(
                &snapshot(10, 0.1, 0.5),
                Tier::Autonomous,
                &criteria,
                Utc::now(),
            );
            // 0.5 * 40 + 0.75 * 30 + 0.5 * 30
            assert!((result.readiness_score - 57.5).abs() < 1e-9);
            assert!(!result.promote);
            assert_eq!(result.blockers, vec![GraduationBlocker::ReadinessBelowThreshold]);
        }

        #[test]
        fn test_behavior_gate_compares_raw_value() {
            let criteria = GraduationCriteria::new(10, 0.5).with_min_behavior_score(0.70);
            let evaluator = GraduationEvaluator::new();
            let almost = evaluator.evaluate(
                &snapshot(100, 0.0, 0.6999),
                Tier::Autonomous,
                &criteria,
                Utc::now(),
            );
            assert!(almost.readiness_score >= 70.0);
            assert!(!almost.promote);
            assert_eq!(almost.blockers, vec![GraduationBlocker::BehaviorBelowMinimum]);

            let exact = evaluator.evaluate(
                &snapshot(100, 0.0, 0.70),
                Tier::Autonomous,
                &criteria,
                Utc::now(),
            );
            assert!(exact.promote);
        }

        #[test]
        fn test_threshold_is_inclusive() {
            // 1.0 * 40 + 1.0 * 30 + 0.0 * 30 = 70
            let criteria = GraduationCriteria::new(10, 0.5).with_threshold(70.0);
            let result = GraduationEvaluator::new().evaluate(
                &snapshot(10, 0.0, 0.0),
                Tier::Autonomous,
                &criteria,
                Utc::now(),
            );
            assert_eq!(result.readiness_score, 70.0);
            assert!(result.promote);
        }

        #[test]
        fn test_nan_inputs_score_zero() {
            let criteria = GraduationCriteria::new(10, 0.5);
            let scores = GraduationEvaluator::new()
                .component_scores(&snapshot(10, f64::NAN, f64::NAN), &criteria);
            assert_eq!(scores.intervention, 0.0);
            assert_eq!(scores.behavior, 0.0);
        }

        #[test]
        fn test_episode_score_monotonic_across_integer_steps() {
            let criteria = GraduationCriteria::new(7, 0.3);
            let evaluator = GraduationEvaluator::new();
            let mut last = -1.0;
            for episodes in 0..=30 {
                let r = evaluator.readiness(
                    &evaluator.component_scores(&snapshot(episodes, 0.1, 0.5), &criteria),
                );
                assert!(r >= last, "readiness dropped at {episodes} episodes");
                last = r;
            }
        }
    }

    // ── Cache ──────────────────────────────────────────────────

    mod cache {
        use chrono::Utc;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::time::Duration;
        use vigil_config::CacheConfig;
        use vigil_core::{Decision, DecisionReason, Tier};
        use vigil_governance::{CacheKey, GovernanceCache, Lookup, ManualClock};

        const TTL: Duration = Duration::from_secs(60);

        fn cache(capacity: usize, shards: usize) -> (GovernanceCache, Arc<ManualClock>) {
            let clock = Arc::new(ManualClock::default());
            let config = CacheConfig {
                ttl_secs: 60,
                capacity,
                shards,
                inflight_wait_ms: 200,
            };
            (GovernanceCache::new(&config, clock.clone()), clock)
        }

        fn allow() -> Decision {
            Decision::allow(Utc::now())
        }

        #[test]
        fn test_key_normalization() {
            let a = CacheKey::new("Agent-7 ", "Deploy", 2, Tier::Intern);
            let b = CacheKey::new("agent-7", "  deploy", 2, Tier::Intern);
            assert_eq!(a, b);
            assert_eq!(a.to_string(), "agent-7|deploy|c2|intern");
            assert_ne!(a, CacheKey::new("agent-7", "deploy", 2, Tier::Supervised));
            assert_ne!(a, CacheKey::new("agent-7", "deploy", 4, Tier::Intern));
        }

        #[test]
        fn test_put_then_get() {
            let (cache, _) = cache(16, 1);
            let key = CacheKey::new("a", "read", 1, Tier::Student);
            assert!(cache.get(&key).is_none());
            cache.put(key.clone(), allow(), TTL);
            assert!(cache.get(&key).unwrap().allowed);
            let stats = cache.stats();
            assert_eq!(stats.hits, 1);
            assert_eq!(stats.misses, 1);
            assert_eq!(stats.entries, 1);
        }

        #[test]
        fn test_entry_expires_exactly_at_ttl() {
            let (cache, clock) = cache(16, 1);
            let key = CacheKey::new("a", "read", 1, Tier::Student);
            cache.put(key.clone(), allow(), TTL);
            let entry = cache.peek(&key).unwrap();
            assert_eq!(entry.expires_at - entry.created_at, chrono::Duration::seconds(60));

            clock.advance(Duration::from_secs(59));
            assert!(cache.get(&key).is_some());

            // now == expires_at
            clock.advance(Duration::from_secs(1));
            assert!(cache.get(&key).is_none());
            assert!(cache.peek(&key).is_none());
            assert_eq!(cache.stats().expirations, 1);
        }

        #[test]
        fn test_zero_ttl_never_served() {
            let (cache, _) = cache(16, 1);
            let key = CacheKey::new("a", "read", 1, Tier::Student);
            cache.put(key.clone(), allow(), Duration::ZERO);
            assert!(cache.get(&key).is_none());
        }

        #[test]
        fn test_hit_refreshes_last_accessed() {
            let (cache, clock) = cache(16, 1);
            let key = CacheKey::new("a", "read", 1, Tier::Student);
            cache.put(key.clone(), allow(), TTL);
            clock.advance(Duration::from_secs(10));
            cache.get(&key).unwrap();
            let entry = cache.peek(&key).unwrap();
            assert_eq!(entry.last_accessed_at - entry.created_at, chrono::Duration::seconds(10));
        }

        #[test]
        fn test_lru_evicts_least_recently_accessed() {
            let (cache, _) = cache(2, 1);
            let a = CacheKey::new("agent", "a", 2, Tier::Intern);
            let b = CacheKey::new("agent", "b", 2, Tier::Intern);
            let c = CacheKey::new("agent", "c", 2, Tier::Intern);
            cache.put(a.clone(), allow(), TTL);
            cache.put(b.clone(), allow(), TTL);
            // Touch a so b becomes the oldest.
            cache.get(&a).unwrap();
            cache.put(c.clone(), allow(), TTL);

            assert_eq!(cache.len(), 2);
            assert!(cache.peek(&a).is_some());
            assert!(cache.peek(&b).is_none());
            assert!(cache.peek(&c).is_some());
            assert_eq!(cache.stats().evictions, 1);
        }

        #[test]
        fn test_capacity_is_global_across_shards() {
            let (cache, _) = cache(10, 4);
            let keys: Vec<CacheKey> = (0..200)
                .map(|i| CacheKey::new(&format!("agent-{i}"), "read", 1, Tier::Student))
                .collect();
            for key in &keys {
                cache.put(key.clone(), allow(), TTL);
                assert!(cache.len() <= 10);
            }
            assert_eq!(cache.capacity(), 10);
            assert_eq!(cache.len(), 10);
            assert_eq!(cache.stats().evictions, 190);
            // Only the ten most recently stored survive, wherever they live.
            for key in &keys[..190] {
                assert!(cache.peek(key).is_none(), "{key} should have been evicted");
            }
            for key in &keys[190..] {
                assert!(cache.peek(key).is_some(), "{key} should still be cached");
            }
        }

        #[test]
        fn test_one_agent_may_use_the_whole_capacity() {
            let (cache, _) = cache(100, 16);
            let keys: Vec<CacheKey> = (0..100)
                .map(|i| CacheKey::new("busy-agent", &format!("action-{i}"), 1, Tier::Student))
                .collect();
            for key in &keys {
                cache.put(key.clone(), allow(), TTL);
            }
            assert_eq!(cache.len(), 100);
            assert_eq!(cache.stats().evictions, 0);

            // Touching the first entry leaves the second as the oldest.
            cache.get(&keys[0]).unwrap();
            cache.put(CacheKey::new("other", "read", 1, Tier::Student), allow(), TTL);
            assert_eq!(cache.len(), 100);
            assert_eq!(cache.stats().evictions, 1);
            assert!(cache.peek(&keys[0]).is_some());
            assert!(cache.peek(&keys[1]).is_none());
        }

        #[test]
        fn test_explicit_evict_picks_global_oldest() {
            let (cache, _) = cache(64, 4);
            let keys: Vec<CacheKey> = ["alpha", "bravo", "charlie", "delta"]
                .iter()
                .map(|agent| CacheKey::new(agent, "read", 1, Tier::Student))
                .collect();
            for key in &keys {
                cache.put(key.clone(), allow(), TTL);
            }
            cache.get(&keys[0]).unwrap();
            assert_eq!(cache.evict(), Some(keys[1].clone()));
            assert_eq!(cache.evict(), Some(keys[2].clone()));
            assert_eq!(cache.len(), 2);
        }

        #[test]
        fn test_evict_empty() {
            let (cache, _) = cache(4, 2);
            assert!(cache.evict().is_none());
        }

        #[test]
        fn test_invalidate_agent_removes_every_action_and_tier() {
            let (cache, _) = cache(64, 4);
            for action in ["Deploy", "read", "write"] {
                cache.put(CacheKey::new("agent-a", action, 2, Tier::Intern), allow(), TTL);
            }
            cache.put(CacheKey::new("agent-a", "deploy", 3, Tier::Supervised), allow(), TTL);
            cache.put(CacheKey::new("agent-b", "deploy", 2, Tier::Intern), allow(), TTL);

            assert_eq!(cache.invalidate_agent("AGENT-A"), 4);
            for action in ["deploy", "read", "write"] {
                assert!(cache.get(&CacheKey::new("agent-a", action, 2, Tier::Intern)).is_none());
            }
            assert!(cache.get(&CacheKey::new("agent-a", "deploy", 3, Tier::Supervised)).is_none());
            assert!(cache.get(&CacheKey::new("agent-b", "deploy", 2, Tier::Intern)).is_some());
            assert_eq!(cache.stats().invalidations, 4);
        }

        #[test]
        fn test_agent_id_with_separator_does_not_collide() {
            let (cache, _) = cache(64, 1);
            cache.put(CacheKey::new("a|x", "y", 2, Tier::Intern), allow(), TTL);
            cache.put(CacheKey::new("a", "x|y", 2, Tier::Intern), allow(), TTL);
            assert_eq!(cache.len(), 2);
            assert_eq!(cache.invalidate_agent("a"), 1);
            assert!(cache.peek(&CacheKey::new("a|x", "y", 2, Tier::Intern)).is_some());
        }

        #[test]
        fn test_purge_expired() {
            let (cache, clock) = cache(64, 4);
            let short = CacheKey::new("a", "short", 1, Tier::Student);
            cache.put(short, allow(), Duration::from_secs(5));
            cache.put(CacheKey::new("b", "long", 1, Tier::Student), allow(), TTL);
            clock.advance(Duration::from_secs(5));
            assert_eq!(cache.purge_expired(), 1);
            assert_eq!(cache.len(), 1);
        }

        #[test]
        fn test_clear() {
            let (cache, _) = cache(64, 4);
            cache.put(CacheKey::new("a", "x", 1, Tier::Student), allow(), TTL);
            cache.put(CacheKey::new("b", "x", 1, Tier::Student), allow(), TTL);
            cache.clear();
            assert!(cache.is_empty());
        }

        #[test]
        fn test_get_or_compute_caches_result() {
            let (cache, _) = cache(64, 4);
            let calls = AtomicUsize::new(0);
            let key = CacheKey::new("a", "deploy", 3, Tier::Supervised);
            let compute = || {
                calls.fetch_add(1, Ordering::SeqCst);
                Decision::deny(DecisionReason::InterventionRateTooHigh, Utc::now())
            };
            let (first, lookup) = cache.get_or_compute(key.clone(), TTL, compute);
            assert_eq!(lookup, Lookup::Computed);
            assert_eq!(first.reason, DecisionReason::InterventionRateTooHigh);

            let (second, lookup) = cache.get_or_compute(key, TTL, || {
                calls.fetch_add(1, Ordering::SeqCst);
                allow()
            });
            assert_eq!(lookup, Lookup::Hit);
            assert_eq!(second, first);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_sweeper_purges_in_background() {
            let (cache, clock) = cache(64, 4);
            let cache = Arc::new(cache);
            cache.put(CacheKey::new("a", "x", 1, Tier::Student), allow(), Duration::from_secs(1));
            clock.advance(Duration::from_secs(2));

            let handle = vigil_governance::spawn_sweeper(cache.clone(), Duration::from_millis(10));
            for _ in 0..100 {
                if cache.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            handle.abort();
            assert!(cache.is_empty());
        }
    }
}
