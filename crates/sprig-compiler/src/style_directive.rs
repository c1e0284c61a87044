use crate::CompileError;

/// A `style:name|modifier` directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleDirective {
    pub name: String,
    pub modifiers: Vec<String>,
}

impl StyleDirective {
    pub fn new(name: &str, modifiers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatedStyle {
    pub name: String,
    pub important: bool,
    /// `style:display|if` on an element: toggle it through
    /// `sprig_core::set_display`, which plays the element's transitions.
    pub display_if: bool,
}

/// Checks the modifiers of a style directive. `on_element` is false when
/// the directive sits on something other than a regular or dynamic element.
pub fn validate_style_directive(
    directive: &StyleDirective,
    on_element: bool,
) -> Result<ValidatedStyle, CompileError> {
    let modifiers: Vec<&str> = directive.modifiers.iter().map(String::as_str).collect();
    let mut validated = ValidatedStyle {
        name: directive.name.clone(),
        ..ValidatedStyle::default()
    };
    match modifiers.as_slice() {
        ["if"] if directive.name == "display" => validated.display_if = on_element,
        [] => {}
        ["important"] => validated.important = true,
        _ => return Err(CompileError::StyleDirectiveModifier),
    }
    Ok(validated)
}
