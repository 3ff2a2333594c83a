use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::View;
use crate::models::ItemType;

/// Which key map is active. Overlays take precedence over the view below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Help,
    Palette,
    Modal,
    Picker,
    Search,
    SettingsEdit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    Quit,
    ShowHelp,
    HideHelp,
    SwitchView(View),
    NextView,
    PrevView,
    MoveUp,
    MoveDown,
    MoveToTop,
    MoveToBottom,
    Refresh,
    Dismiss,
    // Detail modals
    OpenDetail,
    OpenEmail,
    OpenInBrowser,
    CloseModal,
    ScrollUp,
    ScrollDown,
    // Filters
    ToggleType(ItemType),
    CycleStatus,
    ToggleSort,
    ClearTags,
    OpenTagPicker,
    OpenSenderPicker,
    PickerUp,
    PickerDown,
    PickerToggle,
    PickerSave,
    PickerClearSaved,
    PickerClose,
    // In-view search
    StartSearch,
    SearchChar(char),
    SearchBackspace,
    SearchSubmit,
    SearchCancel,
    // Command palette
    OpenPalette,
    PaletteChar(char),
    PaletteBackspace,
    PaletteUp,
    PaletteDown,
    PaletteTab,
    PaletteEnter,
    PaletteClose,
    // Extraction panel
    Extract,
    RefreshUnprocessed,
    TogglePrism,
    // Calendar and catalog
    PrevMonth,
    NextMonth,
    PrevDay,
    NextDay,
    CycleLevel,
    // Settings
    EditSettings,
    SettingsChar(char),
    SettingsBackspace,
    SettingsDone,
    IncreaseLimit,
    DecreaseLimit,
    ToggleDemo,
    ResetDemo,
}

fn is_palette_shortcut(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('k') && key.modifiers.contains(KeyModifiers::CONTROL)
}

pub fn handle_key_event(key: KeyEvent, mode: InputMode) -> Option<AppAction> {
    // If help is showing, any key closes it
    if mode == InputMode::Help {
        return Some(AppAction::HideHelp);
    }

    if mode == InputMode::Palette {
        return match key.code {
            KeyCode::Esc => Some(AppAction::PaletteClose),
            KeyCode::Enter => Some(AppAction::PaletteEnter),
            KeyCode::Tab | KeyCode::BackTab => Some(AppAction::PaletteTab),
            KeyCode::Up => Some(AppAction::PaletteUp),
            KeyCode::Down => Some(AppAction::PaletteDown),
            KeyCode::Backspace => Some(AppAction::PaletteBackspace),
            _ if is_palette_shortcut(&key) => Some(AppAction::PaletteClose),
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(AppAction::PaletteChar(c))
            }
            _ => None,
        };
    }

    // The palette opens from anywhere else, even while typing
    if is_palette_shortcut(&key) {
        return Some(AppAction::OpenPalette);
    }

    match mode {
        InputMode::Modal => {
            return match key.code {
                KeyCode::Esc | KeyCode::Char('q') => Some(AppAction::CloseModal),
                KeyCode::Char('j') | KeyCode::Down => Some(AppAction::ScrollDown),
                KeyCode::Char('k') | KeyCode::Up => Some(AppAction::ScrollUp),
                KeyCode::Char('o') => Some(AppAction::OpenInBrowser),
                KeyCode::Char('m') => Some(AppAction::OpenEmail),
                _ => None,
            };
        }
        InputMode::Picker => {
            return match key.code {
                KeyCode::Esc | KeyCode::Char('q') => Some(AppAction::PickerClose),
                KeyCode::Char('j') | KeyCode::Down => Some(AppAction::PickerDown),
                KeyCode::Char('k') | KeyCode::Up => Some(AppAction::PickerUp),
                KeyCode::Enter | KeyCode::Char(' ') => Some(AppAction::PickerToggle),
                KeyCode::Char('s') => Some(AppAction::PickerSave),
                KeyCode::Char('X') => Some(AppAction::PickerClearSaved),
                KeyCode::Char('x') => Some(AppAction::ClearTags),
                _ => None,
            };
        }
        InputMode::Search => {
            return match key.code {
                KeyCode::Enter => Some(AppAction::SearchSubmit),
                KeyCode::Esc => Some(AppAction::SearchCancel),
                KeyCode::Backspace => Some(AppAction::SearchBackspace),
                KeyCode::Char(c) => Some(AppAction::SearchChar(c)),
                _ => None,
            };
        }
        InputMode::SettingsEdit => {
            return match key.code {
                KeyCode::Enter | KeyCode::Esc => Some(AppAction::SettingsDone),
                KeyCode::Backspace => Some(AppAction::SettingsBackspace),
                KeyCode::Char(c) => Some(AppAction::SettingsChar(c)),
                _ => None,
            };
        }
        InputMode::Normal | InputMode::Help | InputMode::Palette => {}
    }

    // Normal mode
    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) => Some(AppAction::Quit),
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(AppAction::Quit),

        (KeyCode::Char(d @ '1'..='6'), _) => {
            let index = d.to_digit(10).map(|n| n as usize - 1)?;
            View::from_index(index).map(AppAction::SwitchView)
        }
        (KeyCode::Tab, _) => Some(AppAction::NextView),
        (KeyCode::BackTab, _) => Some(AppAction::PrevView),

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(AppAction::MoveDown),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(AppAction::MoveUp),
        (KeyCode::Char('<'), _) | (KeyCode::Home, _) => Some(AppAction::MoveToTop),
        (KeyCode::Char('>'), _) | (KeyCode::End, _) => Some(AppAction::MoveToBottom),

        (KeyCode::Enter, _) => Some(AppAction::OpenDetail),
        (KeyCode::Char('m'), _) => Some(AppAction::OpenEmail),
        (KeyCode::Char('o'), _) => Some(AppAction::OpenInBrowser),
        (KeyCode::Char('r'), _) => Some(AppAction::Refresh),
        (KeyCode::Esc, _) => Some(AppAction::Dismiss),
        (KeyCode::Char('/'), _) => Some(AppAction::StartSearch),

        (KeyCode::Char('e'), _) => Some(AppAction::ToggleType(ItemType::Event)),
        (KeyCode::Char('c'), _) => Some(AppAction::ToggleType(ItemType::Course)),
        (KeyCode::Char('b'), _) => Some(AppAction::ToggleType(ItemType::Blog)),
        (KeyCode::Char('f'), _) => Some(AppAction::CycleStatus),
        (KeyCode::Char('s'), _) => Some(AppAction::ToggleSort),
        (KeyCode::Char('t'), _) => Some(AppAction::OpenTagPicker),
        (KeyCode::Char('F'), _) => Some(AppAction::OpenSenderPicker),
        (KeyCode::Char('x'), _) => Some(AppAction::ClearTags),

        (KeyCode::Char('X'), _) => Some(AppAction::Extract),
        (KeyCode::Char('R'), _) => Some(AppAction::RefreshUnprocessed),
        (KeyCode::Char('p'), _) => Some(AppAction::TogglePrism),

        (KeyCode::Char('H'), _) => Some(AppAction::PrevMonth),
        (KeyCode::Char('L'), _) => Some(AppAction::NextMonth),
        (KeyCode::Char('h'), _) | (KeyCode::Left, _) => Some(AppAction::PrevDay),
        (KeyCode::Char('l'), _) | (KeyCode::Right, _) => Some(AppAction::NextDay),
        (KeyCode::Char('v'), _) => Some(AppAction::CycleLevel),

        (KeyCode::Char('i'), _) => Some(AppAction::EditSettings),
        (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => Some(AppAction::IncreaseLimit),
        (KeyCode::Char('-'), _) => Some(AppAction::DecreaseLimit),
        (KeyCode::Char('d'), _) => Some(AppAction::ToggleDemo),
        (KeyCode::Char('D'), _) => Some(AppAction::ResetDemo),

        (KeyCode::Char('?'), _) => Some(AppAction::ShowHelp),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn digits_switch_views() {
        assert_eq!(
            handle_key_event(key(KeyCode::Char('2')), InputMode::Normal),
            Some(AppAction::SwitchView(View::Events))
        );
        assert_eq!(
            handle_key_event(key(KeyCode::Char('6')), InputMode::Normal),
            Some(AppAction::SwitchView(View::Settings))
        );
        assert_eq!(handle_key_event(key(KeyCode::Char('7')), InputMode::Normal), None);
    }

    #[test]
    fn ctrl_k_opens_palette_even_while_typing() {
        assert_eq!(
            handle_key_event(ctrl('k'), InputMode::Normal),
            Some(AppAction::OpenPalette)
        );
        assert_eq!(
            handle_key_event(ctrl('k'), InputMode::Search),
            Some(AppAction::OpenPalette)
        );
        assert_eq!(
            handle_key_event(ctrl('k'), InputMode::Palette),
            Some(AppAction::PaletteClose)
        );
    }

    #[test]
    fn palette_keys() {
        let mode = InputMode::Palette;
        assert_eq!(handle_key_event(key(KeyCode::Esc), mode), Some(AppAction::PaletteClose));
        assert_eq!(handle_key_event(key(KeyCode::Tab), mode), Some(AppAction::PaletteTab));
        assert_eq!(
            handle_key_event(key(KeyCode::Char('q')), mode),
            Some(AppAction::PaletteChar('q'))
        );
    }

    #[test]
    fn help_swallows_any_key() {
        assert_eq!(
            handle_key_event(key(KeyCode::Char('q')), InputMode::Help),
            Some(AppAction::HideHelp)
        );
    }

    #[test]
    fn typing_modes_capture_letters() {
        assert_eq!(
            handle_key_event(key(KeyCode::Char('q')), InputMode::Search),
            Some(AppAction::SearchChar('q'))
        );
        assert_eq!(
            handle_key_event(key(KeyCode::Char('4')), InputMode::SettingsEdit),
            Some(AppAction::SettingsChar('4'))
        );
        assert_eq!(
            handle_key_event(key(KeyCode::Esc), InputMode::SettingsEdit),
            Some(AppAction::SettingsDone)
        );
    }

    #[test]
    fn normal_mode_letters() {
        assert_eq!(
            handle_key_event(key(KeyCode::Char('c')), InputMode::Normal),
            Some(AppAction::ToggleType(ItemType::Course))
        );
        assert_eq!(handle_key_event(ctrl('c'), InputMode::Normal), Some(AppAction::Quit));
        assert_eq!(
            handle_key_event(key(KeyCode::Char('X')), InputMode::Normal),
            Some(AppAction::Extract)
        );
    }
}
