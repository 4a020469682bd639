//! Static registry of the record kinds the admin console can address.
//!
//! Built once as const data; the query and mutation engines never branch
//! on a concrete kind, only on the field metadata listed here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Float,
    Boolean,
    Date,
    Select,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Select => "select",
        }
    }

    /// Fields the generic search term is matched against. Relations are
    /// excluded separately.
    pub fn searchable(self) -> bool {
        matches!(self, Self::Text | Self::Select | Self::Number | Self::Float)
    }
}

/// Extra shape constraints on text fields, checked on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Email,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub ftype: FieldType,
    pub format: Option<TextFormat>,
    pub nullable: bool,
    /// Assigned by the store on insert; never writable.
    pub auto: bool,
    /// The store fills this column when the caller omits it, so the
    /// nullability check does not demand it.
    pub has_default: bool,
    /// Table name of the referenced kind, when this field holds a
    /// foreign primary key.
    pub relation: Option<&'static str>,
    pub choices: Option<&'static [&'static str]>,
    pub max_len: Option<usize>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl FieldDef {
    const fn new(name: &'static str, ftype: FieldType) -> Self {
        FieldDef {
            name,
            ftype,
            format: None,
            nullable: false,
            auto: false,
            has_default: false,
            relation: None,
            choices: None,
            max_len: None,
            min: None,
            max: None,
        }
    }

    const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    const fn auto(mut self) -> Self {
        self.auto = true;
        self
    }

    const fn email(mut self) -> Self {
        self.format = Some(TextFormat::Email);
        self
    }

    const fn defaulted(mut self) -> Self {
        self.has_default = true;
        self
    }

    const fn relation(mut self, table: &'static str) -> Self {
        self.relation = Some(table);
        self
    }

    const fn choices(mut self, set: &'static [&'static str]) -> Self {
        self.choices = Some(set);
        self
    }

    const fn max_len(mut self, n: usize) -> Self {
        self.max_len = Some(n);
        self
    }

    const fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    const fn at_least(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub kind: &'static str,
    pub table: &'static str,
    pub pk: &'static str,
    /// Rows of read-only kinds are created by the submission workflow
    /// only; the mutation engine refuses them outright.
    pub read_only: bool,
    pub fields: &'static [FieldDef],
}

impl TableDef {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn pk_field(&self) -> &'static FieldDef {
        // Every TableDef below lists its pk among its fields; the
        // catalog unit tests pin this, so a miss is a catalog bug.
        self.fields
            .iter()
            .find(|f| f.name == self.pk)
            .unwrap_or_else(|| panic!("{}: pk {:?} not listed in fields", self.kind, self.pk))
    }
}

const GENDER_CHOICES: &[&str] = &["M", "F", "O"];

const TEACHER_FIELDS: &[FieldDef] = &[
    FieldDef::new("teacher_id", FieldType::Text).max_len(50),
    FieldDef::new("full_name", FieldType::Text).max_len(255),
    FieldDef::new("designation", FieldType::Text).nullable().max_len(255),
];

const SUBJECT_FIELDS: &[FieldDef] = &[
    FieldDef::new("subject_code", FieldType::Text).max_len(50),
    FieldDef::new("subject_name", FieldType::Text).max_len(255),
    FieldDef::new("semester", FieldType::Number).at_least(1),
    FieldDef::new("branch", FieldType::Text).max_len(20),
];

const STUDENT_FIELDS: &[FieldDef] = &[
    FieldDef::new("enrollment_no", FieldType::Text).max_len(50),
    FieldDef::new("full_name", FieldType::Text).max_len(255),
    FieldDef::new("gender", FieldType::Select).choices(GENDER_CHOICES),
    FieldDef::new("email", FieldType::Text).email().max_len(255),
    FieldDef::new("branch", FieldType::Text).max_len(255),
    FieldDef::new("year", FieldType::Number).at_least(1),
    FieldDef::new("semester", FieldType::Number).at_least(1),
    FieldDef::new("section", FieldType::Number).at_least(1),
    FieldDef::new("is_active", FieldType::Boolean).defaulted(),
    FieldDef::new("date_of_birth", FieldType::Date).nullable(),
];

const ALLOCATION_FIELDS: &[FieldDef] = &[
    FieldDef::new("allocation_id", FieldType::Number).auto(),
    FieldDef::new("teacher_id", FieldType::Text).relation("faculty_teacher"),
    FieldDef::new("subject_code", FieldType::Text).relation("academic_subject"),
    FieldDef::new("target_branch", FieldType::Text).max_len(50),
    FieldDef::new("target_year", FieldType::Number).at_least(1),
    FieldDef::new("target_semester", FieldType::Number).at_least(1),
    FieldDef::new("target_section", FieldType::Number).at_least(1),
];

const RESPONSE_FIELDS: &[FieldDef] = &[
    FieldDef::new("response_id", FieldType::Number).auto(),
    FieldDef::new("allocation_id", FieldType::Number).relation("academic_allocation"),
    FieldDef::new("q1_rating", FieldType::Number).range(1, 5),
    FieldDef::new("q2_rating", FieldType::Number).range(1, 5),
    FieldDef::new("q3_rating", FieldType::Number).range(1, 5),
    FieldDef::new("q4_rating", FieldType::Number).range(1, 5),
    FieldDef::new("q5_rating", FieldType::Number).range(1, 5),
    FieldDef::new("q6_rating", FieldType::Number).range(1, 5),
    FieldDef::new("q7_rating", FieldType::Number).range(1, 5),
    FieldDef::new("q8_rating", FieldType::Number).range(1, 5),
    FieldDef::new("q9_rating", FieldType::Number).range(1, 5),
    FieldDef::new("q10_rating", FieldType::Number).range(1, 5),
    FieldDef::new("comments", FieldType::Text).nullable().max_len(500),
];

const LOG_FIELDS: &[FieldDef] = &[
    FieldDef::new("log_id", FieldType::Number).auto(),
    FieldDef::new("response_id", FieldType::Number).relation("feedback_response"),
    FieldDef::new("enrollment_no", FieldType::Text).relation("users_student"),
    FieldDef::new("allocation_id", FieldType::Number).relation("academic_allocation"),
    FieldDef::new("timestamp", FieldType::Date).auto(),
];

const TABLES: &[TableDef] = &[
    TableDef {
        kind: "Teacher",
        table: "faculty_teacher",
        pk: "teacher_id",
        read_only: false,
        fields: TEACHER_FIELDS,
    },
    TableDef {
        kind: "Subject",
        table: "academic_subject",
        pk: "subject_code",
        read_only: false,
        fields: SUBJECT_FIELDS,
    },
    TableDef {
        kind: "Student",
        table: "users_student",
        pk: "enrollment_no",
        read_only: false,
        fields: STUDENT_FIELDS,
    },
    TableDef {
        kind: "Allocation",
        table: "academic_allocation",
        pk: "allocation_id",
        read_only: false,
        fields: ALLOCATION_FIELDS,
    },
    TableDef {
        kind: "FeedbackResponse",
        table: "feedback_response",
        pk: "response_id",
        read_only: true,
        fields: RESPONSE_FIELDS,
    },
    TableDef {
        kind: "SubmissionLog",
        table: "feedback_submissionlog",
        pk: "log_id",
        read_only: true,
        fields: LOG_FIELDS,
    },
];

pub fn all() -> &'static [TableDef] {
    TABLES
}

/// Resolve a caller-supplied name to a table descriptor. Callers may
/// address a kind ("Teacher") or its stored table ("faculty_teacher"),
/// in any case.
pub fn lookup(name: &str) -> Option<&'static TableDef> {
    let wanted = name.trim();
    TABLES.iter().find(|t| {
        t.kind.eq_ignore_ascii_case(wanted) || t.table.eq_ignore_ascii_case(wanted)
    })
}
