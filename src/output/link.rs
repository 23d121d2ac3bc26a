//! Hyperlink/action metadata
//!
//! Links are constructed at decode time from MXP tag state and attached to
//! exactly one text fragment. The action URL encoding is the
//! consumer-facing string form used for click dispatch; internet links
//! bypass it and pass through as literal URLs.

use serde::{Deserialize, Serialize};

/// Where activating a link sends its action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendTo {
    /// Open the action as a URL
    Internet,
    /// Send the action to the game server
    World,
    /// Insert the action into the input box
    Input,
}

/// Local link destinations, i.e. everything except `Internet`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalSendTo {
    World,
    Input,
}

/// Clickable action metadata on a text fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxpLink {
    /// Text sent or inserted on activation
    pub action: String,
    /// Tooltip hint, if the tag provided one
    pub hint: Option<String>,
    /// Choice menu entries for multi-action links
    pub prompts: Vec<String>,
    pub sendto: SendTo,
}

impl MxpLink {
    pub fn new(action: impl Into<String>, sendto: SendTo) -> Self {
        Self {
            action: action.into(),
            hint: None,
            prompts: Vec::new(),
            sendto,
        }
    }
}

/// Encode a link destination into the action URL string
pub fn serialize_action_url(sendto: SendTo, action: &str) -> String {
    match sendto {
        SendTo::Internet => action.to_owned(),
        SendTo::Input => format!("input:{action}"),
        SendTo::World => format!("send:{action}"),
    }
}

/// Decode an action URL produced by [`serialize_action_url`]
///
/// Internet URLs are not ours to decode and return `None`.
pub fn deserialize_action_url(url: &str) -> Option<(InternalSendTo, &str)> {
    let (scheme, action) = url.split_once(':')?;
    match scheme {
        "input" => Some((InternalSendTo::Input, action)),
        "send" => Some((InternalSendTo::World, action)),
        _ => None,
    }
}
