//! Graph API request parameters and response shapes

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default metrics for `get_insights`.
pub const DEFAULT_INSIGHT_METRICS: &str = "views,likes,replies,reposts,quotes";
pub const DEFAULT_INSIGHT_PERIOD: &str = "day";

pub const DEFAULT_MEDIA_FIELDS: &str = "id,media_product_type,media_type,media_url,permalink,owner,username,text,timestamp,shortcode,thumbnail_url,is_quote_post,quoted_post,has_replies";
pub const DEFAULT_REPLY_FIELDS: &str =
    "id,text,username,permalink,timestamp,media_type,has_replies,is_reply,hide_status,root_post,replied_to";
pub const QUOTA_FIELDS: &str = "quota_usage,config";

/// A response that is either the object itself or `{ "data": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: Vec<T> },
    Bare(T),
}

impl<T> Envelope<T> {
    /// First element, failing with `MalformedResponse(empty_message)` when
    /// the data array is empty.
    pub(crate) fn into_single(self, empty_message: &str) -> Result<T> {
        match self {
            Envelope::Bare(item) => Ok(item),
            Envelope::Wrapped { data } => data
                .into_iter()
                .next()
                .ok_or_else(|| Error::MalformedResponse(empty_message.to_string())),
        }
    }
}

/// List response with cursor paging passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursors: Option<Cursors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cursors {
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

/// One named metric time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub name: String,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub values: Vec<InsightValue>,
    #[serde(default)]
    pub total_value: Option<serde_json::Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightValue {
    pub value: serde_json::Value,
    #[serde(default)]
    pub end_time: Option<String>,
}

/// Reference to another media object by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
}

/// A published thread, with the quoted post nested when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsMedia {
    pub id: String,
    #[serde(default)]
    pub media_product_type: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub owner: Option<MediaRef>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub shortcode: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub is_quote_post: Option<bool>,
    #[serde(default)]
    pub quoted_post: Option<Box<ThreadsMedia>>,
    #[serde(default)]
    pub has_replies: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub has_replies: Option<bool>,
    #[serde(default)]
    pub is_reply: Option<bool>,
    #[serde(default)]
    pub hide_status: Option<String>,
    #[serde(default)]
    pub root_post: Option<MediaRef>,
    #[serde(default)]
    pub replied_to: Option<MediaRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Text,
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Text => "TEXT",
            MediaType::Image => "IMAGE",
            MediaType::Video => "VIDEO",
        }
    }
}

/// Who may reply to a new post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyControl {
    Everyone,
    AccountsYouFollow,
    MentionedOnly,
}

impl ReplyControl {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyControl::Everyone => "everyone",
            ReplyControl::AccountsYouFollow => "accounts_you_follow",
            ReplyControl::MentionedOnly => "mentioned_only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyAction {
    Hide,
    Unhide,
}

/// Parameters for a new (unpublished) media container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateContainerParams {
    #[serde(default)]
    pub media_type: Option<MediaType>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub quote_post_id: Option<String>,
    #[serde(default)]
    pub reply_control: Option<ReplyControl>,
}

impl CreateContainerParams {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Explicit type wins; otherwise a video URL means VIDEO, an image URL
    /// means IMAGE and anything else is TEXT.
    pub fn effective_media_type(&self) -> MediaType {
        if let Some(media_type) = self.media_type {
            return media_type;
        }
        if self.video_url.is_some() {
            MediaType::Video
        } else if self.image_url.is_some() {
            MediaType::Image
        } else {
            MediaType::Text
        }
    }

    /// Form body for `POST /me/threads`.
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("media_type", self.effective_media_type().as_str().to_string())];
        let optional = [
            ("text", &self.text),
            ("image_url", &self.image_url),
            ("video_url", &self.video_url),
            ("reply_to_id", &self.reply_to_id),
            ("quote_post_id", &self.quote_post_id),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                form.push((key, value.clone()));
            }
        }
        if let Some(control) = self.reply_control {
            form.push(("reply_control", control.as_str().to_string()));
        }
        form
    }
}

/// `{ "id": ... }` returned by container creation and publish.
#[derive(Debug, Deserialize)]
pub(crate) struct IdResponse {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SuccessResponse {
    #[serde(default = "default_true")]
    pub success: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn media_type_inference() {
        assert_eq!(
            CreateContainerParams::text("hello").effective_media_type(),
            MediaType::Text
        );

        let image = CreateContainerParams {
            image_url: Some("https://cdn.test/a.png".into()),
            ..Default::default()
        };
        assert_eq!(image.effective_media_type(), MediaType::Image);

        let video = CreateContainerParams {
            video_url: Some("https://cdn.test/a.mp4".into()),
            ..Default::default()
        };
        assert_eq!(video.effective_media_type(), MediaType::Video);

        let explicit = CreateContainerParams {
            media_type: Some(MediaType::Text),
            image_url: Some("https://cdn.test/a.png".into()),
            ..Default::default()
        };
        assert_eq!(explicit.effective_media_type(), MediaType::Text);
    }

    #[test]
    fn form_omits_absent_fields() {
        let params = CreateContainerParams {
            text: Some("quoting".into()),
            quote_post_id: Some("q-1".into()),
            reply_control: Some(ReplyControl::MentionedOnly),
            ..Default::default()
        };
        let form: HashMap<_, _> = params.to_form().into_iter().collect();
        assert_eq!(form["media_type"], "TEXT");
        assert_eq!(form["text"], "quoting");
        assert_eq!(form["quote_post_id"], "q-1");
        assert_eq!(form["reply_control"], "mentioned_only");
        assert!(!form.contains_key("image_url"));
        assert!(!form.contains_key("reply_to_id"));
    }

    #[test]
    fn envelope_accepts_both_shapes() {
        let bare: Envelope<MediaRef> = serde_json::from_str(r#"{"id":"1"}"#).unwrap();
        assert_eq!(bare.into_single("none").unwrap().id, "1");

        let wrapped: Envelope<MediaRef> =
            serde_json::from_str(r#"{"data":[{"id":"2"},{"id":"3"}]}"#).unwrap();
        assert_eq!(wrapped.into_single("none").unwrap().id, "2");

        let empty: Envelope<MediaRef> = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        match empty.into_single("No quota data returned") {
            Err(Error::MalformedResponse(msg)) => assert_eq!(msg, "No quota data returned"),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn quoted_post_nests() {
        let media: ThreadsMedia = serde_json::from_str(
            r#"{"id":"m1","is_quote_post":true,"quoted_post":{"id":"q1","text":"original"}}"#,
        )
        .unwrap();
        let quoted = media.quoted_post.unwrap();
        assert_eq!(quoted.id, "q1");
        assert_eq!(quoted.text.as_deref(), Some("original"));
    }

    #[test]
    fn paging_passes_through() {
        let page: Paginated<Reply> = serde_json::from_str(
            r#"{"data":[{"id":"r1"}],"paging":{"cursors":{"before":"b1","after":"a1"},"next":"https://next"}}"#,
        )
        .unwrap();
        let paging = page.paging.unwrap();
        assert_eq!(paging.cursors.unwrap().after.as_deref(), Some("a1"));
        assert_eq!(paging.next.as_deref(), Some("https://next"));
        assert!(paging.previous.is_none());
    }
}
