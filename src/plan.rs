//! Splitting one `send` call into the requests Webex will accept.
//!
//! Webex takes at most one file per message. The message text rides on the
//! first request, every further attachment follows in its own bodiless
//! request, in caller order.

use crate::config::Config;
use crate::models::{Attachment, Destination, MessageFormat};

/// One planned request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUnit {
    pub index: usize,
    pub destination: Destination,
    pub body: Option<String>,
    /// Set iff `body` is set.
    pub format: Option<MessageFormat>,
    pub attachment: Option<Attachment>,
}

/// Progress of a unit while the plan executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
    /// Never sent because an earlier unit failed.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPlan {
    units: Vec<RequestUnit>,
}

impl RequestPlan {
    /// Build the plan. Pure: no file or network access.
    ///
    /// An empty message counts as no message. The caller is responsible for
    /// rejecting the case where there is neither a message nor an attachment.
    pub fn build(config: &Config, message: Option<&str>, attachments: Vec<Attachment>) -> Self {
        let body = message.filter(|m| !m.is_empty()).map(str::to_string);
        let destination = config.destination();
        let format = config.format();

        let unit = |index: usize, body: Option<String>, attachment: Option<Attachment>| RequestUnit {
            index,
            destination: destination.clone(),
            format: body.as_ref().map(|_| format),
            body,
            attachment,
        };

        let mut attachments = attachments.into_iter();
        let mut units = vec![unit(0, body, attachments.next())];
        for (offset, attachment) in attachments.enumerate() {
            units.push(unit(offset + 1, None, Some(attachment)));
        }
        Self { units }
    }

    pub fn units(&self) -> &[RequestUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn into_units(self) -> Vec<RequestUnit> {
        self.units
    }
}
