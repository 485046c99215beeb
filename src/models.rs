use serde::{Deserialize, Serialize};

/// One score row returned by the remote lookup / 远程查询返回的单条成绩
///
/// Every field is optional on the wire; the service omits whatever it does not know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(default)]
    pub exam_name: Option<String>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub score: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub student_num: Option<String>,
    #[serde(default, rename = "search_time")]
    pub search_timestamp: Option<String>,
}

/// Deduplication identity: (student_num, exam_name, course, score) / 去重键
pub type RecordKey = (Option<String>, Option<String>, Option<String>, Option<String>);

impl ScoreRecord {
    pub fn key(&self) -> RecordKey {
        (
            self.student_num.clone(),
            self.exam_name.clone(),
            self.course.clone(),
            self.score.clone(),
        )
    }
}
