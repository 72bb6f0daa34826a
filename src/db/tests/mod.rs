mod migrations;
mod records;

use crate::db::*;

pub(super) fn meeting(meeting_id: &str) -> Meeting {
    Meeting {
        meeting_id: meeting_id.to_string(),
        year: 2019,
        date: "20 December".to_string(),
        topic: "The situation in the Middle East".to_string(),
        url: format!("https://undocs.org/en/{meeting_id}"),
        full_text: "transcript".to_string(),
        veto_used_in_meeting: false,
    }
}

pub(super) fn resolution(draft_id: &str, meeting_id: &str, status: ResolutionStatus) -> Resolution {
    Resolution {
        draft_id: draft_id.to_string(),
        final_id: None,
        draft_url: format!("https://undocs.org/en/{draft_id}"),
        final_url: None,
        status,
        draft_text: "draft text".to_string(),
        final_text: None,
        year: 2019,
        meeting_id: meeting_id.to_string(),
    }
}
