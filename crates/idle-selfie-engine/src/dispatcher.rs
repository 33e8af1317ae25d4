use idle_selfie_contracts::prompts::{build_instruction, substitute_macros};
use idle_selfie_contracts::settings::{DispatchMode, IdleSettings, SendAs};

use crate::host::ChatHost;

/// Host path a dispatch took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchRoute {
    Continue,
    Regenerate,
    Impersonate,
    Swipe,
    /// Instruction inserted as a visible message, then a reply requested.
    Visible(SendAs),
    /// Instruction sent as a hidden prompt; nothing visible is inserted.
    Background(SendAs),
}

impl DispatchRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Regenerate => "regenerate",
            Self::Impersonate => "impersonate",
            Self::Swipe => "swipe",
            Self::Visible(_) => "visible",
            Self::Background(_) => "background",
        }
    }
}

/// Turns the selfie instruction into exactly one host generation request.
///
/// The caller cancels its countdown before dispatching; nothing here touches
/// timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptDispatcher;

impl PromptDispatcher {
    pub fn build_instruction(character: Option<&str>, flavor: Option<&str>) -> String {
        build_instruction(character, flavor)
    }

    pub fn dispatch<H: ChatHost + ?Sized>(
        &self,
        settings: &IdleSettings,
        host: &H,
        instruction: &str,
    ) -> DispatchRoute {
        match settings.dispatch_mode {
            DispatchMode::Continuation => {
                host.continue_last();
                DispatchRoute::Continue
            }
            DispatchMode::Regenerate => {
                host.regenerate_last();
                DispatchRoute::Regenerate
            }
            DispatchMode::Impersonation => {
                host.impersonate_user();
                DispatchRoute::Impersonate
            }
            DispatchMode::Swipe => {
                host.swipe_next();
                DispatchRoute::Swipe
            }
            DispatchMode::Direct if settings.include_prompt => {
                send_visible(host, settings.send_as, instruction);
                DispatchRoute::Visible(settings.send_as)
            }
            DispatchMode::Direct => {
                host.send_background_prompt(settings.send_as, instruction);
                DispatchRoute::Background(settings.send_as)
            }
        }
    }
}

fn send_visible<H: ChatHost + ?Sized>(host: &H, send_as: SendAs, instruction: &str) {
    match send_as {
        // The user path goes through the normal send flow, which generates
        // the reply on its own.
        SendAs::User => {
            let text = substitute_macros(
                instruction,
                host.character_name().as_deref(),
                host.user_name().as_deref(),
            );
            host.send_as_user(&text);
        }
        SendAs::Char => {
            let name = host.character_name().unwrap_or_default();
            host.send_as_character(&name, instruction);
            host.send_background_prompt(SendAs::Char, "");
        }
        SendAs::System => {
            host.send_as_narrator(instruction);
            host.send_background_prompt(SendAs::System, "");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHost;

    fn direct(include_prompt: bool, send_as: SendAs) -> IdleSettings {
        IdleSettings {
            dispatch_mode: DispatchMode::Direct,
            include_prompt,
            send_as,
            ..IdleSettings::default()
        }
    }

    #[test]
    fn host_action_modes_route_to_one_action() {
        let cases = [
            (DispatchMode::Continuation, "continue_last"),
            (DispatchMode::Regenerate, "regenerate_last"),
            (DispatchMode::Impersonation, "impersonate_user"),
            (DispatchMode::Swipe, "swipe_next"),
        ];
        for (mode, expected) in cases {
            let host = RecordingHost::new("Mira");
            let settings = IdleSettings {
                dispatch_mode: mode,
                include_prompt: true,
                ..IdleSettings::default()
            };
            PromptDispatcher.dispatch(&settings, &host, "ignored");
            assert_eq!(host.calls(), vec![expected.to_string()], "{mode:?}");
        }
    }

    #[test]
    fn direct_background_inserts_nothing_visible() {
        let host = RecordingHost::new("Mira");
        let route = PromptDispatcher.dispatch(&direct(false, SendAs::Char), &host, "be cute");
        assert_eq!(route, DispatchRoute::Background(SendAs::Char));
        assert_eq!(host.calls(), vec!["send_background_prompt:char:be cute".to_string()]);
        assert!(host.messages().is_empty());
    }

    #[test]
    fn direct_user_substitutes_macros() {
        let host = RecordingHost::new("Mira");
        host.set_user_name("Ada");
        let route = PromptDispatcher.dispatch(
            &direct(true, SendAs::User),
            &host,
            "{{char}} waves at {{user}}",
        );
        assert_eq!(route, DispatchRoute::Visible(SendAs::User));
        assert_eq!(host.calls(), vec!["send_as_user:Mira waves at Ada".to_string()]);
    }

    #[test]
    fn direct_char_and_system_request_reply_after_inserting() {
        let host = RecordingHost::new("Mira");
        PromptDispatcher.dispatch(&direct(true, SendAs::Char), &host, "pose");
        assert_eq!(
            host.calls(),
            vec![
                "send_as_character:Mira:pose".to_string(),
                "send_background_prompt:char:".to_string(),
            ]
        );

        let host = RecordingHost::new("Mira");
        PromptDispatcher.dispatch(&direct(true, SendAs::System), &host, "scene");
        assert_eq!(
            host.calls(),
            vec![
                "send_as_narrator:scene".to_string(),
                "send_background_prompt:system:".to_string(),
            ]
        );
    }
}
