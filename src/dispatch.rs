//! Routing of send requests to their destinations
//!
//! Every [`SendRequest`] passes through [`dispatch`], which either claims
//! the request for a core destination or hands it back untouched. Targets
//! the core does not implement (notepads, logging sinks, script engines)
//! come back as [`Dispatched::NotConsumed`] so an embedding front-end can
//! route them itself; a front-end that ignores them loses nothing but the
//! optional feature.

use crate::output::{MxpLink, SendRequest, SendTarget, SendTo};

/// Outcome of routing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Transmit to the server; `delayed` requests should be queued by the
    /// caller rather than sent in order
    World { text: String, delayed: bool },
    /// Feed back through the input pipeline as if typed
    Command(String),
    /// Append to the output display
    Output(String),
    /// Show in the status line
    Status(String),
    /// A non-core target; the embedder may handle it or drop it
    NotConsumed(SendRequest),
}

/// Route one send request
pub fn dispatch(request: SendRequest) -> Dispatched {
    match request.send_to {
        SendTarget::World | SendTarget::WorldImmediate => Dispatched::World {
            text: request.text,
            delayed: false,
        },
        SendTarget::WorldDelay => Dispatched::World {
            text: request.text,
            delayed: true,
        },
        SendTarget::Command => Dispatched::Command(request.text),
        SendTarget::Output => Dispatched::Output(request.text),
        SendTarget::Status => Dispatched::Status(request.text),
        _ => {
            tracing::debug!(target = ?request.send_to, "unrouted send target");
            Dispatched::NotConsumed(request)
        }
    }
}

/// Build the send request for an activated link
///
/// Internet links are never dispatched here; opening a URL is the
/// front-end's business.
pub fn link_request(link: &MxpLink) -> Option<SendRequest> {
    match link.sendto {
        SendTo::World => Some(SendRequest::new(SendTarget::World, link.action.clone())),
        SendTo::Input => Some(SendRequest::new(SendTarget::Command, link.action.clone())),
        SendTo::Internet => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_targets_route_to_server() {
        let result = dispatch(SendRequest::new(SendTarget::World, "north"));
        assert_eq!(
            result,
            Dispatched::World {
                text: "north".to_owned(),
                delayed: false,
            }
        );
        let result = dispatch(SendRequest::new(SendTarget::WorldDelay, "south"));
        assert_eq!(
            result,
            Dispatched::World {
                text: "south".to_owned(),
                delayed: true,
            }
        );
    }

    #[test]
    fn test_command_target_feeds_input() {
        let result = dispatch(SendRequest::new(SendTarget::Command, "say hi"));
        assert_eq!(result, Dispatched::Command("say hi".to_owned()));
    }

    #[test]
    fn test_non_core_targets_bounce_back() {
        let request = SendRequest::new(SendTarget::NotepadAppend, "note");
        let result = dispatch(request.clone());
        assert_eq!(result, Dispatched::NotConsumed(request));
    }

    #[test]
    fn test_link_click_becomes_request() {
        let link = MxpLink::new("buy bread", SendTo::World);
        let request = link_request(&link).unwrap();
        assert_eq!(request.send_to, SendTarget::World);
        assert_eq!(request.text, "buy bread");
    }

    #[test]
    fn test_internet_link_is_not_dispatched() {
        let link = MxpLink::new("https://example.com", SendTo::Internet);
        assert!(link_request(&link).is_none());
    }
}
