#[cfg(test)]
mod tests {
    use crate::attributes::*;
    use crate::blocks::*;
    use crate::config::{RuntimeOptions, with_options};
    use crate::dev::{Advisory, add_sink};
    use crate::dom::*;
    use crate::effects::*;
    use crate::hydration::*;
    use crate::signal::*;
    use crate::transition::*;
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration;
    use web_time::Instant;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn fade() -> Rc<Transition> {
        Transition::local(AnimationSpec::tween(Duration::from_millis(50), Easing::Linear))
    }

    fn settle() {
        tick_at(Instant::now() + Duration::from_secs(3600));
    }

    struct Fixture {
        dom: Dom,
        target: NodeId,
        cond: Signal<Option<bool>>,
        block: Rc<Cell<Option<EffectId>>>,
        app: EffectId,
    }

    fn conditional(initial: Option<bool>, with_transitions: bool) -> Fixture {
        let dom = Dom::new();
        let target = dom.create_element("div");
        let cond = signal(initial);
        let block = Rc::new(Cell::new(None));
        let app = mount(&dom, target, {
            let cond = cond.clone();
            let block = block.clone();
            move |anchor| {
                let id = if_block(
                    anchor,
                    move |b| match cond.get() {
                        Some(flag) => b.set_flag(flag, move |a, _| {
                            a.text(if flag { "yes" } else { "no" });
                            if with_transitions {
                                register_transition(fade());
                            }
                        }),
                        None => {}
                    },
                    ChainLink::root(),
                );
                block.set(Some(id));
            }
        });
        Fixture {
            dom,
            target,
            cond,
            block,
            app,
        }
    }

    fn active_branches(block: EffectId) -> usize {
        branch_effects(block)
            .into_iter()
            .filter(|id| effect_state(*id) == EffectState::Active)
            .count()
    }

    proptest! {
        #[test]
        fn at_most_one_branch_is_active(changes in proptest::collection::vec(proptest::option::of(any::<bool>()), 0..24)) {
            let f = conditional(Some(true), true);
            let block = f.block.get().unwrap();
            prop_assert!(active_branches(block) <= 1);
            for c in changes {
                f.cond.set(c);
                prop_assert!(active_branches(block) <= 1);
            }
            settle();
            prop_assert!(active_branches(block) <= 1);
            prop_assert!(branch_effects(block).len() <= 1);
            destroy(f.app);
        }

        #[test]
        fn class_removal_is_idempotent(
            base in "[a-c ]{0,12}",
            removed in proptest::collection::vec("[a-c]{1,2}", 0..6),
        ) {
            let toggles: Vec<(String, bool)> = removed.into_iter().map(|k| (k, false)).collect();
            let once = to_class(Some(base.as_str()), None, Some(toggles.as_slice()));
            let twice = to_class(once.as_deref(), None, Some(toggles.as_slice()));
            prop_assert_eq!(&twice, &once);
            for (key, _) in &toggles {
                let tokens: Vec<&str> = once.as_deref().unwrap_or_default().split(' ').collect();
                prop_assert!(!tokens.contains(&key.as_str()));
            }
        }
    }

    #[test]
    fn flipping_back_resumes_the_same_branch() {
        let f = conditional(Some(true), true);
        let block = f.block.get().unwrap();
        let original = branch_effects(block);
        assert_eq!(original.len(), 1);

        f.cond.set(Some(false));
        assert_eq!(effect_state(original[0]), EffectState::Paused);
        assert_eq!(branch_effects(block).len(), 2);

        f.cond.set(Some(true));
        assert_eq!(effect_state(original[0]), EffectState::Active);

        settle();
        assert_eq!(branch_effects(block), original);
        assert_eq!(f.dom.inner_html(f.target), "yes<!---->");
        destroy(f.app);
    }

    #[test]
    fn null_condition_pauses_everything() {
        let f = conditional(Some(true), false);
        let block = f.block.get().unwrap();
        f.cond.set(None);
        assert!(branch_effects(block).is_empty());
        assert_eq!(f.dom.inner_html(f.target), "<!---->");
        f.cond.set(Some(false));
        assert_eq!(f.dom.inner_html(f.target), "no<!---->");
        destroy(f.app);
        assert_eq!(f.dom.inner_html(f.target), "");
    }

    #[test]
    fn same_condition_changes_nothing() {
        let f = conditional(Some(true), false);
        let block = f.block.get().unwrap();
        let before = branch_effects(block);
        let created = f.dom.stats().created;
        f.cond.set(Some(true));
        assert_eq!(branch_effects(block), before);
        assert_eq!(f.dom.stats().created, created);
        destroy(f.app);
    }

    fn server_markup(marker: &str, content: &str) -> (Dom, NodeId) {
        let dom = Dom::new();
        let target = dom.create_element("div");
        for n in [
            dom.create_comment(marker),
            dom.create_text(content),
            dom.create_comment(HYDRATION_END),
        ] {
            dom.append_child(target, n);
        }
        (dom, target)
    }

    fn hydrate_conditional(dom: &Dom, target: NodeId, truthy: bool) -> (EffectId, Vec<Advisory>) {
        init_logger();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let opts = RuntimeOptions {
            dev: true,
            ..RuntimeOptions::default()
        };
        let app = with_options(opts, || {
            let s = seen.clone();
            let sink = add_sink(move |a| s.borrow_mut().push(a.clone()));
            let app = hydrate(dom, target, move |anchor| {
                if_block(
                    anchor,
                    move |b| {
                        if truthy {
                            b.set(|a, _| {
                                a.text("yes");
                            });
                        } else {
                            b.set_flag(false, |a, _| {
                                a.text("no");
                            });
                        }
                    },
                    ChainLink::root(),
                );
            });
            sink.run();
            app
        });
        let advisories = seen.borrow().clone();
        (app, advisories)
    }

    #[test]
    fn matching_marker_adopts_server_nodes() {
        let (dom, target) = server_markup(HYDRATION_START, "yes");
        let before = dom.stats();
        let (app, advisories) = hydrate_conditional(&dom, target, true);
        assert!(advisories.is_empty());
        assert_eq!(dom.stats(), before);
        assert_eq!(dom.inner_html(target), "<!--[-->yes<!--]-->");
        assert!(!hydrating());
        destroy(app);
        assert_eq!(dom.inner_html(target), "");
    }

    #[test]
    fn else_marker_adopts_alternate() {
        let (dom, target) = server_markup(HYDRATION_START_ELSE, "no");
        let before = dom.stats();
        let (app, advisories) = hydrate_conditional(&dom, target, false);
        assert!(advisories.is_empty());
        assert_eq!(dom.stats(), before);
        destroy(app);
    }

    #[test]
    fn mismatched_marker_rebuilds_once() {
        let (dom, target) = server_markup(HYDRATION_START_ELSE, "no");
        let before = dom.stats();
        let (app, advisories) = hydrate_conditional(&dom, target, true);

        assert_eq!(
            advisories,
            vec![Advisory::HydrationMismatch {
                root_index: 0,
                marker: Some(HYDRATION_START_ELSE.to_string()),
            }]
        );
        assert_eq!(dom.stats().removed, before.removed + 1);
        assert_eq!(dom.stats().created, before.created + 1);
        assert_eq!(dom.inner_html(target), "<!--[!-->yes<!--]-->");
        assert!(!hydrating());
        destroy(app);
        assert_eq!(dom.inner_html(target), "");
    }

    #[test]
    fn unparseable_marker_is_a_mismatch() {
        let (dom, target) = server_markup("[x", "no");
        let (app, advisories) = hydrate_conditional(&dom, target, false);
        assert_eq!(advisories.len(), 1);
        assert_eq!(dom.inner_html(target), "<!--[x-->no<!--]-->");
        destroy(app);
    }

    #[test]
    fn else_if_chain_reads_the_depth_marker() {
        // {#if a}A{:else if b}B{:else}C{/if} rendered with a=false, b=true
        let (dom, target) = server_markup("[1", "B");
        let before = dom.stats();
        let app = hydrate(&dom, target, |anchor| {
            if_block(
                anchor,
                |b| {
                    b.set_flag(false, |a, link| {
                        if_block(
                            a,
                            |b| {
                                b.set(|a, _| {
                                    a.text("B");
                                });
                            },
                            link,
                        );
                    });
                },
                ChainLink::root(),
            );
        });
        assert_eq!(dom.stats(), before);
        destroy(app);
        assert_eq!(dom.inner_html(target), "");
    }

    #[test]
    fn destroying_a_hydrated_block_removes_its_markers() {
        for (marker, truthy) in [
            (HYDRATION_START, true),
            (HYDRATION_START_ELSE, false),
            (HYDRATION_START_ELSE, true),
            ("[x", false),
        ] {
            let (dom, target) = server_markup(marker, "server");
            let tail = dom.create_text("tail");
            dom.append_child(target, tail);

            let (app, _) = hydrate_conditional(&dom, target, truthy);
            destroy(app);
            assert_eq!(dom.inner_html(target), "tail", "marker {marker:?}, truthy {truthy}");
        }

        let mounted = conditional(Some(true), false);
        destroy(mounted.app);
        assert_eq!(mounted.dom.inner_html(mounted.target), "");
    }

    #[test]
    fn style_merge_keeps_commented_fragment() {
        let styles = StyleOverrides::normal(&[("height", "5px")]);
        let merged = to_style(Some("color: red /* ; */"), Some(&styles)).unwrap_or_default();
        assert!(merged.starts_with("color: red /* ; */"));
        assert!(merged.ends_with("height:5px;"));
    }
}
