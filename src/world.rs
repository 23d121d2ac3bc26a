//! World configuration snapshot
//!
//! A flat, immutable value describing one game world: connection details,
//! logging preferences, appearance, input handling, MXP/protocol options,
//! and scripting stubs. It is loaded or built by the host, handed wholesale
//! to the resolvers and the decoder at session start, and superseded
//! wholesale on the next settings commit. The core never mutates it and
//! never performs file I/O on it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::color::{ColorOption, RgbColor, DEFAULT_ANSI};

/// Automatic login handshake style
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoConnect {
    #[default]
    None,
    Mush,
    Diku,
    Mxp,
}

/// Log file output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    #[default]
    Text,
    Html,
    Raw,
}

/// Log file open mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogMode {
    #[default]
    Append,
    Overwrite,
}

/// When to honor MXP markup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UseMxp {
    /// Only when the server negotiates it
    #[default]
    Command,
    /// Ask the server, then follow its answer
    Query,
    Always,
    Never,
}

/// Optional foreground/background pair for echoed input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPair {
    pub foreground: ColorOption,
    pub background: ColorOption,
}

/// Commands bound to the numeric keypad
///
/// `base` holds the plain-key bindings, `modified` the Ctrl-key layer.
/// Keys are the keypad characters `0`-`9`, `.`, `/`, `*`, `-`, `+`; an
/// absent or empty entry means the key types itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumpadMapping {
    pub base: BTreeMap<char, String>,
    pub modified: BTreeMap<char, String>,
}

impl NumpadMapping {
    /// The classic navigation layout (compass directions plus look,
    /// inventory, score, up and down)
    pub fn navigation() -> Self {
        let base = [
            ('0', "look"),
            ('1', "sw"),
            ('2', "south"),
            ('3', "se"),
            ('4', "west"),
            ('5', "WHO"),
            ('6', "east"),
            ('7', "nw"),
            ('8', "north"),
            ('9', "ne"),
            ('.', "hide"),
            ('/', "inventory"),
            ('*', "score"),
            ('-', "up"),
            ('+', "down"),
        ]
        .into_iter()
        .map(|(key, send)| (key, send.to_owned()))
        .collect();
        Self {
            base,
            modified: BTreeMap::new(),
        }
    }

    /// Look up the command bound to a key, if any
    pub fn get(&self, key: char, modified: bool) -> Option<&str> {
        let layer = if modified { &self.modified } else { &self.base };
        layer.get(&key).map(String::as_str).filter(|send| !send.is_empty())
    }
}

/// One world's complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct World {
    // Connection
    pub name: String,
    pub site: String,
    pub port: u16,
    pub use_proxy: bool,
    pub proxy_server: String,
    pub proxy_port: u16,
    pub proxy_username: String,
    pub proxy_password: String,
    pub save_world_automatically: bool,

    // Login
    pub player: String,
    pub password: String,
    pub connect_method: AutoConnect,
    pub connect_text: String,

    // Logging
    pub log_file_preamble: String,
    pub log_file_postamble: String,
    pub log_format: LogFormat,
    pub log_output: bool,
    pub log_input: bool,
    pub log_notes: bool,
    pub log_mode: LogMode,
    pub auto_log_file_name: String,
    pub log_preamble_output: String,
    pub log_preamble_input: String,
    pub log_preamble_notes: String,
    pub log_postamble_output: String,
    pub log_postamble_input: String,
    pub log_postamble_notes: String,

    // Output appearance
    pub show_bold: bool,
    pub show_italic: bool,
    pub show_underline: bool,
    pub ansi_colors: Vec<RgbColor>,
    pub use_default_colors: bool,
    pub indent_paras: u8,
    pub new_activity_sound: String,

    // Input
    pub display_my_input: bool,
    pub echo_colors: ColorPair,
    pub keep_commands_on_same_line: bool,
    pub command_history_size: usize,
    pub enable_command_stack: bool,
    pub command_stack_character: char,

    // MXP / protocol
    pub use_mxp: UseMxp,
    pub ignore_mxp_colour_changes: bool,
    pub use_custom_link_colour: bool,
    pub hyperlink_colour: RgbColor,
    pub mud_can_change_link_colour: bool,
    pub underline_hyperlinks: bool,
    pub hyperlink_adds_to_command_history: bool,
    pub echo_hyperlink_in_output_window: bool,
    pub terminal_identification: String,
    pub disable_compression: bool,
    pub naws: bool,
    pub carriage_return_clears_line: bool,
    pub utf_8: bool,
    pub convert_ga_to_newline: bool,
    pub no_echo_off: bool,

    // Aliases / triggers / timers (rule sets live with their engines)
    pub enable_aliases: bool,
    pub enable_triggers: bool,
    pub enable_timers: bool,

    // Keypad
    pub numpad_enable: bool,
    pub numpad_shortcuts: NumpadMapping,

    // Scripting stubs
    pub enable_scripts: bool,
    pub world_script: String,
    pub note_text_colour: RgbColor,
    pub error_colour: RgbColor,

    pub plugins: Vec<String>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            name: String::new(),
            site: String::new(),
            port: 4000,
            use_proxy: false,
            proxy_server: String::new(),
            proxy_port: 1080,
            proxy_username: String::new(),
            proxy_password: String::new(),
            save_world_automatically: false,

            player: String::new(),
            password: String::new(),
            connect_method: AutoConnect::default(),
            connect_text: String::new(),

            log_file_preamble: String::new(),
            log_file_postamble: String::new(),
            log_format: LogFormat::default(),
            log_output: true,
            log_input: true,
            log_notes: false,
            log_mode: LogMode::default(),
            auto_log_file_name: String::new(),
            log_preamble_output: String::new(),
            log_preamble_input: String::new(),
            log_preamble_notes: String::new(),
            log_postamble_output: String::new(),
            log_postamble_input: String::new(),
            log_postamble_notes: String::new(),

            show_bold: true,
            show_italic: true,
            show_underline: true,
            ansi_colors: DEFAULT_ANSI.to_vec(),
            use_default_colors: true,
            indent_paras: 0,
            new_activity_sound: String::new(),

            display_my_input: true,
            echo_colors: ColorPair::default(),
            keep_commands_on_same_line: false,
            command_history_size: 1000,
            enable_command_stack: false,
            command_stack_character: ';',

            use_mxp: UseMxp::default(),
            ignore_mxp_colour_changes: false,
            use_custom_link_colour: false,
            hyperlink_colour: RgbColor::rgb(43, 121, 162),
            mud_can_change_link_colour: true,
            underline_hyperlinks: true,
            hyperlink_adds_to_command_history: true,
            echo_hyperlink_in_output_window: true,
            terminal_identification: "mudlark".to_owned(),
            disable_compression: false,
            naws: false,
            carriage_return_clears_line: false,
            utf_8: true,
            convert_ga_to_newline: false,
            no_echo_off: false,

            enable_aliases: true,
            enable_triggers: true,
            enable_timers: true,

            numpad_enable: true,
            numpad_shortcuts: NumpadMapping::navigation(),

            enable_scripts: false,
            world_script: String::new(),
            note_text_colour: RgbColor::rgb(0, 128, 255),
            error_colour: RgbColor::rgb(255, 0, 0),

            plugins: Vec::new(),
        }
    }
}

impl World {
    /// The palette this world renders under
    pub fn palette(&self) -> crate::color::Palette {
        if self.use_default_colors {
            crate::color::Palette::default()
        } else {
            crate::color::Palette::custom(&self.ansi_colors)
        }
    }

    /// Whether MXP may ever be active for this world
    pub fn mxp_permitted(&self) -> bool {
        self.use_mxp != UseMxp::Never
    }
}
