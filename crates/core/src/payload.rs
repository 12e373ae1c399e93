//! Typed views of document content.
//!
//! Each form type has a struct and an explicit mapping between its fields
//! and content keys. Keys the mapping does not know end up in `extra`
//! instead of being dropped.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::field_value::{Content, FieldValue};
use crate::registry::{ACTIVITY_LOG, GENERAL_MESSAGE, RADIO_PLAN};
use crate::synonyms::normalize_keys;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPayload {
    GeneralMessage(GeneralMessage),
    ActivityLog(ActivityLog),
    RadioPlan(RadioPlan),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneralMessage {
    pub incident_name: Option<String>,
    pub to: Option<String>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub message: Option<String>,
    pub approved_by: Option<String>,
    pub position: Option<String>,
    pub reply: Option<String>,
    pub replied_by: Option<String>,
    pub reply_date: Option<String>,
    pub extra: Content,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityEntry {
    pub time: Option<String>,
    pub activity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignedPerson {
    pub name: Option<String>,
    pub position: Option<String>,
    pub home_agency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityLog {
    pub incident_name: Option<String>,
    pub operational_period: Option<String>,
    pub unit_name: Option<String>,
    pub unit_leader: Option<String>,
    pub home_agency: Option<String>,
    pub prepared_by: Option<String>,
    pub personnel: Vec<AssignedPerson>,
    pub entries: Vec<ActivityEntry>,
    pub extra: Content,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioChannel {
    pub channel: Option<String>,
    pub function: Option<String>,
    pub frequency: Option<String>,
    pub assignment: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioPlan {
    pub incident_name: Option<String>,
    pub operational_period: Option<String>,
    pub date_prepared: Option<String>,
    pub prepared_by: Option<String>,
    pub special_instructions: Option<String>,
    pub channels: Vec<RadioChannel>,
    pub extra: Content,
}

/// Pulls mapped keys out of a content map; whatever is left is "extra".
struct FieldMap<'a> {
    form_type: &'a str,
    fields: Content,
}

impl<'a> FieldMap<'a> {
    fn new(form_type: &'a str, content: &Content) -> Self {
        Self {
            form_type,
            fields: normalize_keys(content),
        }
    }

    fn text(&mut self, key: &str) -> Result<Option<String>, CoreError> {
        take_text(self.form_type, &mut self.fields, key)
    }

    fn rows<T>(
        &mut self,
        key: &str,
        mut row: impl FnMut(&mut BTreeMap<String, FieldValue>) -> Result<T, CoreError>,
    ) -> Result<Vec<T>, CoreError> {
        match self.fields.remove(key) {
            None | Some(FieldValue::Null) => Ok(Vec::new()),
            Some(FieldValue::List(items)) => items
                .into_iter()
                .map(|item| match item {
                    FieldValue::Record(mut map) => row(&mut map),
                    _ => Err(self.type_error(key, "a list of records")),
                })
                .collect(),
            Some(_) => Err(self.type_error(key, "a list of records")),
        }
    }

    fn type_error(&self, field: &str, expected: &'static str) -> CoreError {
        CoreError::FieldType {
            form_type: self.form_type.to_string(),
            field: field.to_string(),
            expected,
        }
    }

    fn extra(self) -> Content {
        self.fields
    }
}

fn take_text(
    form_type: &str,
    fields: &mut BTreeMap<String, FieldValue>,
    key: &str,
) -> Result<Option<String>, CoreError> {
    match fields.remove(key) {
        None | Some(FieldValue::Null) => Ok(None),
        Some(FieldValue::Text(s)) => Ok(Some(s)),
        Some(FieldValue::Integer(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(CoreError::FieldType {
            form_type: form_type.to_string(),
            field: key.to_string(),
            expected: "text",
        }),
    }
}

fn put_text(content: &mut Content, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        content.insert(key.to_string(), FieldValue::Text(v.clone()));
    }
}

fn record(pairs: &[(&str, &Option<String>)]) -> FieldValue {
    let mut map = BTreeMap::new();
    for (key, value) in pairs {
        if let Some(v) = value {
            map.insert(key.to_string(), FieldValue::Text(v.clone()));
        }
    }
    FieldValue::Record(map)
}

impl FormPayload {
    /// Map content onto the typed payload for `form_type`.
    pub fn from_content(form_type: &str, content: &Content) -> Result<Self, CoreError> {
        match form_type {
            GENERAL_MESSAGE => {
                let mut map = FieldMap::new(form_type, content);
                Ok(Self::GeneralMessage(GeneralMessage {
                    incident_name: map.text("incident_name")?,
                    to: map.text("to")?,
                    from: map.text("from")?,
                    subject: map.text("subject")?,
                    date: map.text("date")?,
                    time: map.text("time")?,
                    message: map.text("message")?,
                    approved_by: map.text("approved_by")?,
                    position: map.text("position")?,
                    reply: map.text("reply")?,
                    replied_by: map.text("replied_by")?,
                    reply_date: map.text("reply_date")?,
                    extra: map.extra(),
                }))
            }
            ACTIVITY_LOG => {
                let mut map = FieldMap::new(form_type, content);
                let entries = map.rows("activity_log", |row| {
                    Ok(ActivityEntry {
                        time: take_text(form_type, row, "time")?,
                        activity: take_text(form_type, row, "activity")?,
                    })
                })?;
                let personnel = map.rows("personnel_list", |row| {
                    Ok(AssignedPerson {
                        name: take_text(form_type, row, "name")?,
                        position: take_text(form_type, row, "position")?,
                        home_agency: take_text(form_type, row, "home_agency")?,
                    })
                })?;
                Ok(Self::ActivityLog(ActivityLog {
                    incident_name: map.text("incident_name")?,
                    operational_period: map.text("operational_period")?,
                    unit_name: map.text("unit_name")?,
                    unit_leader: map.text("unit_leader")?,
                    home_agency: map.text("home_agency")?,
                    prepared_by: map.text("prepared_by")?,
                    personnel,
                    entries,
                    extra: map.extra(),
                }))
            }
            RADIO_PLAN => {
                let mut map = FieldMap::new(form_type, content);
                let channels = map.rows("channels", |row| {
                    Ok(RadioChannel {
                        channel: take_text(form_type, row, "channel")?,
                        function: take_text(form_type, row, "function")?,
                        frequency: take_text(form_type, row, "frequency")?,
                        assignment: take_text(form_type, row, "assignment")?,
                        remarks: take_text(form_type, row, "remarks")?,
                    })
                })?;
                Ok(Self::RadioPlan(RadioPlan {
                    incident_name: map.text("incident_name")?,
                    operational_period: map.text("operational_period")?,
                    date_prepared: map.text("date_prepared")?,
                    prepared_by: map.text("prepared_by")?,
                    special_instructions: map.text("special_instructions")?,
                    channels,
                    extra: map.extra(),
                }))
            }
            other => Err(CoreError::UnknownFormType(other.to_string())),
        }
    }

    pub fn form_type(&self) -> &'static str {
        match self {
            Self::GeneralMessage(_) => GENERAL_MESSAGE,
            Self::ActivityLog(_) => ACTIVITY_LOG,
            Self::RadioPlan(_) => RADIO_PLAN,
        }
    }

    /// Flatten back to content with canonical keys.
    pub fn to_content(&self) -> Content {
        match self {
            Self::GeneralMessage(m) => {
                let mut content = m.extra.clone();
                put_text(&mut content, "incident_name", &m.incident_name);
                put_text(&mut content, "to", &m.to);
                put_text(&mut content, "from", &m.from);
                put_text(&mut content, "subject", &m.subject);
                put_text(&mut content, "date", &m.date);
                put_text(&mut content, "time", &m.time);
                put_text(&mut content, "message", &m.message);
                put_text(&mut content, "approved_by", &m.approved_by);
                put_text(&mut content, "position", &m.position);
                put_text(&mut content, "reply", &m.reply);
                put_text(&mut content, "replied_by", &m.replied_by);
                put_text(&mut content, "reply_date", &m.reply_date);
                content
            }
            Self::ActivityLog(log) => {
                let mut content = log.extra.clone();
                put_text(&mut content, "incident_name", &log.incident_name);
                put_text(&mut content, "operational_period", &log.operational_period);
                put_text(&mut content, "unit_name", &log.unit_name);
                put_text(&mut content, "unit_leader", &log.unit_leader);
                put_text(&mut content, "home_agency", &log.home_agency);
                put_text(&mut content, "prepared_by", &log.prepared_by);
                content.insert(
                    "activity_log".to_string(),
                    FieldValue::List(
                        log.entries
                            .iter()
                            .map(|e| record(&[("time", &e.time), ("activity", &e.activity)]))
                            .collect(),
                    ),
                );
                if !log.personnel.is_empty() {
                    content.insert(
                        "personnel_list".to_string(),
                        FieldValue::List(
                            log.personnel
                                .iter()
                                .map(|p| {
                                    record(&[
                                        ("name", &p.name),
                                        ("position", &p.position),
                                        ("home_agency", &p.home_agency),
                                    ])
                                })
                                .collect(),
                        ),
                    );
                }
                content
            }
            Self::RadioPlan(plan) => {
                let mut content = plan.extra.clone();
                put_text(&mut content, "incident_name", &plan.incident_name);
                put_text(&mut content, "operational_period", &plan.operational_period);
                put_text(&mut content, "date_prepared", &plan.date_prepared);
                put_text(&mut content, "prepared_by", &plan.prepared_by);
                put_text(&mut content, "special_instructions", &plan.special_instructions);
                content.insert(
                    "channels".to_string(),
                    FieldValue::List(
                        plan.channels
                            .iter()
                            .map(|c| {
                                record(&[
                                    ("channel", &c.channel),
                                    ("function", &c.function),
                                    ("frequency", &c.frequency),
                                    ("assignment", &c.assignment),
                                    ("remarks", &c.remarks),
                                ])
                            })
                            .collect(),
                    ),
                );
                content
            }
        }
    }
}
