//! 员工档案数据模型
//!
//! 文档库无 schema：所有字段缺省可空，未知字段保存在 extra 中原样回传给模型。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactDetails {
    pub email: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobDetails {
    pub job_title: String,
    pub department: String,
    pub hire_date: String,
    pub employment_type: String,
    pub salary: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkLocation {
    pub nearest_major_city: String,
    pub is_remote: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceReview {
    pub review_date: String,
    pub rating: f64,
    pub comments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Benefits {
    pub health_insurance: String,
    pub retirement_plan: String,
    pub paid_time_off: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyContact {
    pub name: String,
    pub relationship: String,
    pub phone_number: String,
}

/// 员工档案
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmployeeRecord {
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub address: Address,
    pub contact_details: ContactDetails,
    pub job_details: JobDetails,
    pub work_location: WorkLocation,
    pub reporting_manager: Option<String>,
    pub skills: Vec<String>,
    pub performance_reviews: Vec<PerformanceReview>,
    pub benefits: Benefits,
    pub emergency_contact: EmergencyContact,
    pub notes: String,
    /// 文档中的其他字段（如 _id）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmployeeRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// 用于向量化的文本投影；离线入库工具对每条档案调用一次
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} {}", self.employee_id, self.full_name())];

        let job = &self.job_details;
        if !job.job_title.is_empty() || !job.department.is_empty() {
            parts.push(format!("{} in {}", job.job_title, job.department));
        }
        if !job.employment_type.is_empty() {
            parts.push(format!("{} since {}", job.employment_type, job.hire_date));
        }
        if job.salary > 0.0 {
            parts.push(format!("salary {} {}", job.salary, job.currency));
        }

        let loc = &self.work_location;
        if !loc.nearest_major_city.is_empty() {
            let mode = if loc.is_remote { "remote" } else { "on-site" };
            parts.push(format!("based near {} ({})", loc.nearest_major_city, mode));
        }
        if !self.address.city.is_empty() {
            parts.push(format!(
                "lives in {}, {}, {}",
                self.address.city, self.address.state, self.address.country
            ));
        }
        if let Some(manager) = self.reporting_manager.as_deref().filter(|m| !m.is_empty()) {
            parts.push(format!("reports to {}", manager));
        }
        if !self.skills.is_empty() {
            parts.push(format!("skills: {}", self.skills.join(", ")));
        }
        for review in &self.performance_reviews {
            parts.push(format!(
                "review {} rated {}: {}",
                review.review_date, review.rating, review.comments
            ));
        }
        if !self.benefits.health_insurance.is_empty() {
            parts.push(format!(
                "benefits: {}, {}, {} days PTO",
                self.benefits.health_insurance, self.benefits.retirement_plan, self.benefits.paid_time_off
            ));
        }
        if !self.notes.is_empty() {
            parts.push(format!("notes: {}", self.notes));
        }
        parts.join(". ")
    }
}

/// 向量检索命中；只在一次查询内存在
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub employee_id: String,
    pub score: f32,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_deserialize_keeps_unknown_fields() {
        let raw = json!({
            "_id": "abc",
            "employee_id": "E001",
            "first_name": "Ada",
            "skills": ["Python", "SQL"],
            "job_details": {"job_title": "Data Engineer"}
        });
        let rec: EmployeeRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(rec.employee_id, "E001");
        assert_eq!(rec.last_name, "");
        assert_eq!(rec.job_details.job_title, "Data Engineer");
        assert_eq!(rec.extra["_id"], "abc");

        let back = serde_json::to_value(&rec).unwrap();
        assert_eq!(back["_id"], "abc");
    }

    #[test]
    fn test_summary_mentions_skills_and_role() {
        let rec = EmployeeRecord {
            employee_id: "E002".into(),
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            skills: vec!["Java".into(), "COBOL".into()],
            job_details: JobDetails {
                job_title: "Engineer".into(),
                department: "Platform".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let s = rec.summary();
        assert!(s.starts_with("E002 Grace Hopper"));
        assert!(s.contains("Engineer in Platform"));
        assert!(s.contains("skills: Java, COBOL"));
    }
}
