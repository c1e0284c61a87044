use sprig_core::events::{ListenerPlan, Modifier, is_valid_wildcard_alias};

use crate::{CompileError, CompileOptions, Warning, list};

/// Events that browsers treat as passive-capable; handlers for them are
/// made passive when they cannot call `prevent_default`.
pub const PASSIVE_EVENTS: [&str; 5] = ["wheel", "touchstart", "touchmove", "touchend", "touchcancel"];

/// What the compiler knows about a handler expression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandlerInfo {
    /// The handler takes no parameters, so it cannot touch the event.
    pub can_make_passive: bool,
}

/// An `on:name|mod|mod={handler}` directive. Without a handler the
/// directive forwards the event and the modifiers are alias names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDirective {
    pub name: String,
    pub modifiers: Vec<String>,
    pub handler: Option<HandlerInfo>,
}

impl EventDirective {
    pub fn handler(name: &str, modifiers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
            handler: Some(HandlerInfo::default()),
        }
    }

    pub fn forward(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            modifiers: aliases.iter().map(|m| m.to_string()).collect(),
            handler: None,
        }
    }

    pub fn passive_capable(mut self) -> Self {
        self.handler = Some(HandlerInfo {
            can_make_passive: true,
        });
        self
    }

    fn has(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedHandler {
    pub name: String,
    /// Deduplicated, in source order, plus an implied `passive`.
    pub modifiers: Vec<Modifier>,
    pub plan: ListenerPlan,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedForward {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidatedDirective {
    Handler(ValidatedHandler),
    Forward(ValidatedForward),
}

pub fn validate_event_directive(
    directive: &EventDirective,
    options: &CompileOptions,
) -> Result<(ValidatedDirective, Vec<Warning>), CompileError> {
    let mut warnings = Vec::new();
    let validated = match directive.handler {
        Some(info) => ValidatedDirective::Handler(validate_handler(directive, info, options, &mut warnings)?),
        None => ValidatedDirective::Forward(validate_forward(directive, &mut warnings)?),
    };
    if options.dev {
        for w in &warnings {
            log::warn!("{w}");
        }
    }
    Ok((validated, warnings))
}

fn valid_modifier_list() -> String {
    let names: Vec<&str> = Modifier::ALL.iter().map(|m| m.name()).collect();
    list(&names, "or")
}

fn validate_handler(
    directive: &EventDirective,
    info: HandlerInfo,
    options: &CompileOptions,
    warnings: &mut Vec<Warning>,
) -> Result<ValidatedHandler, CompileError> {
    let name = directive.name.as_str();
    if name == "*" {
        return Err(CompileError::HandlerOnAnyEvent);
    }
    if name.is_empty() || name.contains('*') {
        return Err(CompileError::InvalidEventName(name.to_string()));
    }
    if directive.has("passive") && directive.has("preventDefault") {
        return Err(CompileError::ModifierCombination("passive", "preventDefault"));
    }
    if directive.has("passive") && directive.has("nonpassive") {
        return Err(CompileError::ModifierCombination("passive", "nonpassive"));
    }

    let is_passive_event = PASSIVE_EVENTS.contains(&name);
    let mut modifiers: Vec<Modifier> = Vec::new();
    for raw in &directive.modifiers {
        let modifier: Modifier = raw
            .parse()
            .map_err(|_| CompileError::InvalidModifier(valid_modifier_list()))?;
        if modifier == Modifier::Passive {
            if !is_passive_event {
                warnings.push(Warning::RedundantPassive {
                    event: name.to_string(),
                });
            } else if info.can_make_passive {
                warnings.push(Warning::RedundantPassiveForTouch {
                    event: name.to_string(),
                });
            }
        }
        if options.legacy && matches!(modifier, Modifier::Once | Modifier::Passive) {
            return Err(CompileError::LegacyModifier(modifier.name()));
        }
        if !modifiers.contains(&modifier) {
            modifiers.push(modifier);
        }
    }

    if is_passive_event
        && info.can_make_passive
        && !modifiers.contains(&Modifier::PreventDefault)
        && !modifiers.contains(&Modifier::NonPassive)
        && !modifiers.contains(&Modifier::Passive)
    {
        log::debug!("on:{name}: handler ignores the event, registering it as passive");
        modifiers.push(Modifier::Passive);
    }

    let plan = ListenerPlan::from_modifiers(&modifiers);
    Ok(ValidatedHandler {
        name: name.to_string(),
        modifiers,
        plan,
    })
}

fn validate_forward(
    directive: &EventDirective,
    warnings: &mut Vec<Warning>,
) -> Result<ValidatedForward, CompileError> {
    let name = directive.name.as_str();
    if directive.modifiers.len() > 1 {
        return Err(CompileError::ForwardAliasCount);
    }
    if name != "*" && (name.is_empty() || name.contains('*')) {
        return Err(CompileError::InvalidEventName(name.to_string()));
    }
    let alias = directive.modifiers.first().cloned();
    if let Some(alias) = &alias {
        if name == "*" && !is_valid_wildcard_alias(alias) {
            return Err(CompileError::ForwardAnyAlias(alias.clone()));
        }
        if name != "*" && alias.contains('*') {
            return Err(CompileError::ForwardAlias {
                event: name.to_string(),
                alias: alias.clone(),
            });
        }
        if Modifier::is_modifier_name(alias) {
            warnings.push(Warning::AliasIsModifier {
                event: name.to_string(),
                alias: alias.clone(),
            });
        }
    }
    Ok(ValidatedForward {
        name: name.to_string(),
        alias,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sprig_core::events::Guard;

    fn check(d: &EventDirective) -> Result<(ValidatedDirective, Vec<Warning>), CompileError> {
        validate_event_directive(d, &CompileOptions::default())
    }

    fn handler_of(v: ValidatedDirective) -> ValidatedHandler {
        match v {
            ValidatedDirective::Handler(h) => h,
            ValidatedDirective::Forward(f) => panic!("expected a handler, got {f:?}"),
        }
    }

    #[test]
    fn passive_conflicts_are_errors() {
        assert_eq!(
            check(&EventDirective::handler("click", &["passive", "preventDefault"])).unwrap_err(),
            CompileError::ModifierCombination("passive", "preventDefault")
        );
        assert_eq!(
            check(&EventDirective::handler("wheel", &["nonpassive", "passive"])).unwrap_err(),
            CompileError::ModifierCombination("passive", "nonpassive")
        );
    }

    #[test]
    fn passive_outside_touch_is_a_warning() {
        let (v, warnings) = check(&EventDirective::handler("click", &["passive"])).unwrap();
        assert_eq!(
            warnings,
            vec![Warning::RedundantPassive {
                event: "click".into()
            }]
        );
        assert_eq!(handler_of(v).plan.options.passive, Some(true));

        let (_, warnings) =
            check(&EventDirective::handler("touchmove", &["passive"]).passive_capable()).unwrap();
        assert_eq!(
            warnings,
            vec![Warning::RedundantPassiveForTouch {
                event: "touchmove".into()
            }]
        );
    }

    #[test]
    fn unknown_modifier_lists_the_valid_set() {
        let err = check(&EventDirective::handler("click", &["prevent"])).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Valid event modifiers are preventDefault, stopPropagation, stopImmediatePropagation, capture, once, passive, nonpassive, self or trusted"
        );
    }

    #[test]
    fn touch_handlers_become_passive() {
        let (v, _) = check(&EventDirective::handler("touchstart", &[]).passive_capable()).unwrap();
        let h = handler_of(v);
        assert_eq!(h.modifiers, vec![Modifier::Passive]);
        assert_eq!(h.plan.options.passive, Some(true));

        let (v, _) = check(&EventDirective::handler("touchstart", &["preventDefault"]).passive_capable()).unwrap();
        let h = handler_of(v);
        assert_eq!(h.plan.options.passive, None);
        assert_eq!(h.plan.guards.as_slice(), &[Guard::PreventDefault]);

        let (v, _) = check(&EventDirective::handler("touchstart", &[])).unwrap();
        assert_eq!(handler_of(v).plan.options.passive, None);
    }

    #[test]
    fn legacy_mode_rejects_once_and_passive() {
        let opts = CompileOptions {
            legacy: true,
            ..CompileOptions::default()
        };
        assert_eq!(
            validate_event_directive(&EventDirective::handler("click", &["once"]), &opts).unwrap_err(),
            CompileError::LegacyModifier("once")
        );
        assert!(validate_event_directive(&EventDirective::handler("click", &["capture"]), &opts).is_ok());
    }

    #[test]
    fn modifiers_are_deduplicated_in_source_order() {
        let (v, _) = check(&EventDirective::handler(
            "click",
            &["stopPropagation", "capture", "stopPropagation", "trusted"],
        ))
        .unwrap();
        let h = handler_of(v);
        assert_eq!(
            h.modifiers,
            vec![Modifier::StopPropagation, Modifier::Capture, Modifier::Trusted]
        );
        assert_eq!(h.plan.guards.as_slice(), &[Guard::Trusted, Guard::StopPropagation]);
        assert!(h.plan.options.capture);
    }

    #[test]
    fn forwarding_rules() {
        assert_eq!(
            check(&EventDirective::handler("*", &[])).unwrap_err(),
            CompileError::HandlerOnAnyEvent
        );
        assert_eq!(
            check(&EventDirective::forward("click", &["a", "b"])).unwrap_err(),
            CompileError::ForwardAliasCount
        );
        assert_eq!(
            check(&EventDirective::forward("*", &["in*ner"])).unwrap_err(),
            CompileError::ForwardAnyAlias("in*ner".into())
        );
        assert_eq!(
            check(&EventDirective::forward("click", &["inner-*"])).unwrap_err(),
            CompileError::ForwardAlias {
                event: "click".into(),
                alias: "inner-*".into()
            }
        );

        let (v, warnings) = check(&EventDirective::forward("*", &["inner-*"])).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(
            v,
            ValidatedDirective::Forward(ValidatedForward {
                name: "*".into(),
                alias: Some("inner-*".into())
            })
        );

        let (_, warnings) = check(&EventDirective::forward("click", &["once"])).unwrap();
        assert_eq!(
            warnings,
            vec![Warning::AliasIsModifier {
                event: "click".into(),
                alias: "once".into()
            }]
        );
    }

    proptest! {
        #[test]
        fn wildcard_aliases_need_one_star_at_an_edge(alias in "[a-c*-]{1,6}") {
            let accepted = check(&EventDirective::forward("*", &[alias.as_str()])).is_ok();
            let stars = alias.matches('*').count();
            let at_edge = alias.starts_with('*') || alias.ends_with('*');
            prop_assert_eq!(accepted, stars == 1 && at_edge);
        }
    }
}
