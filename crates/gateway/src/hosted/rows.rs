//! [`NotesBackend`] over the hosted row API.

use async_trait::async_trait;
use keepmd_core::note::{NewNote, Note, NotePatch};
use keepmd_core::tag::{NewTag, NoteTag, Tag};
use keepmd_core::types::{NoteId, TagId, Timestamp, UserId};
use keepmd_events::realtime::{spawn_channel, ChannelConfig};
use keepmd_events::{ChangeBinding, Subscription};
use serde_json::Value;

use super::http::{check_status, parse_response};
use super::HostedClient;
use crate::backend::NotesBackend;
use crate::error::{GatewayError, GatewayResult};

/// Note columns plus tags embedded through the join table.
const NOTES_SELECT: &str = "*,tags:note_tags(tag:tags(*))";

const PREFER_REPRESENTATION: &str = "return=representation";
const PREFER_MINIMAL: &str = "return=minimal";
const PREFER_INSERT_IGNORE: &str = "resolution=ignore-duplicates,return=representation";

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Decode a note row whose `tags` column holds `[{ "tag": {...} }]`
/// join entries. Entries whose tag is missing are skipped.
pub(crate) fn note_from_joined_row(mut row: Value) -> Result<Note, serde_json::Error> {
    let joined = row
        .as_object_mut()
        .and_then(|obj| obj.remove("tags"))
        .unwrap_or(Value::Null);

    let mut note = Note::from_row(row)?;
    if let Value::Array(entries) = joined {
        for entry in entries {
            match entry.get("tag") {
                Some(tag) if !tag.is_null() => note.tags.push(serde_json::from_value(tag.clone())?),
                _ => {}
            }
        }
    }
    Ok(note)
}

#[async_trait]
impl NotesBackend for HostedClient {
    async fn list_notes(&self, user_id: UserId) -> GatewayResult<Vec<Note>> {
        let response = self
            .authorized(self.http.get(self.rest_url("notes")))
            .query(&[
                ("select", NOTES_SELECT.to_string()),
                ("user_id", eq(user_id)),
                ("order", "is_pinned.desc,created_at.desc".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<Value> = parse_response(response).await?;
        rows.into_iter()
            .map(|row| note_from_joined_row(row).map_err(GatewayError::from))
            .collect()
    }

    async fn insert_note(&self, note: &NewNote) -> GatewayResult<Note> {
        let response = self
            .authorized(self.http.post(self.rest_url("notes")))
            .header("Prefer", PREFER_REPRESENTATION)
            .json(note)
            .send()
            .await?;

        let rows: Vec<Value> = parse_response(response).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound("Insert returned no note row".into()))?;
        Ok(Note::from_row(row)?)
    }

    async fn update_note(
        &self,
        id: NoteId,
        patch: &NotePatch,
        updated_at: Timestamp,
    ) -> GatewayResult<()> {
        let mut body = serde_json::to_value(patch)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("updated_at".into(), serde_json::to_value(updated_at)?);
        }

        let response = self
            .authorized(self.http.patch(self.rest_url("notes")))
            .header("Prefer", PREFER_MINIMAL)
            .query(&[("id", eq(id))])
            .json(&body)
            .send()
            .await?;

        check_status(response).await
    }

    async fn delete_note(&self, id: NoteId) -> GatewayResult<()> {
        let response = self
            .authorized(self.http.delete(self.rest_url("notes")))
            .query(&[("id", eq(id))])
            .send()
            .await?;

        check_status(response).await
    }

    async fn list_tags(&self, user_id: UserId) -> GatewayResult<Vec<Tag>> {
        let response = self
            .authorized(self.http.get(self.rest_url("tags")))
            .query(&[
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
                ("order", "name.asc".to_string()),
            ])
            .send()
            .await?;

        parse_response(response).await
    }

    async fn find_tag(&self, user_id: UserId, name: &str) -> GatewayResult<Option<Tag>> {
        let response = self
            .authorized(self.http.get(self.rest_url("tags")))
            .query(&[
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
                ("name", eq(name)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let tags: Vec<Tag> = parse_response(response).await?;
        Ok(tags.into_iter().next())
    }

    async fn create_or_get_tag(&self, tag: &NewTag) -> GatewayResult<Tag> {
        let response = self
            .authorized(self.http.post(self.rest_url("tags")))
            .header("Prefer", PREFER_INSERT_IGNORE)
            .query(&[("on_conflict", "user_id,name")])
            .json(tag)
            .send()
            .await?;

        // An ignored duplicate comes back as an empty array.
        let created: Vec<Tag> = parse_response(response).await?;
        if let Some(created) = created.into_iter().next() {
            return Ok(created);
        }
        self.find_tag(tag.user_id, &tag.name).await?.ok_or_else(|| {
            GatewayError::NotFound(format!("Tag '{}' vanished after upsert", tag.name))
        })
    }

    async fn delete_tag(&self, id: TagId) -> GatewayResult<()> {
        let response = self
            .authorized(self.http.delete(self.rest_url("tags")))
            .query(&[("id", eq(id))])
            .send()
            .await?;

        check_status(response).await
    }

    async fn insert_note_tag(&self, link: NoteTag) -> GatewayResult<()> {
        let response = self
            .authorized(self.http.post(self.rest_url("note_tags")))
            .header("Prefer", PREFER_MINIMAL)
            .json(&link)
            .send()
            .await?;

        check_status(response).await
    }

    async fn delete_note_tag(&self, link: NoteTag) -> GatewayResult<()> {
        let response = self
            .authorized(self.http.delete(self.rest_url("note_tags")))
            .query(&[("note_id", eq(link.note_id)), ("tag_id", eq(link.tag_id))])
            .send()
            .await?;

        check_status(response).await
    }

    async fn subscribe(
        &self,
        channel: &str,
        bindings: Vec<ChangeBinding>,
    ) -> GatewayResult<Subscription> {
        let access_token = self.current_session().map(|s| s.access_token);
        let config = ChannelConfig::new(channel, bindings).with_access_token(access_token);
        tracing::debug!(channel, "Opening realtime channel");
        Ok(spawn_channel(self.realtime.clone(), config))
    }
}
