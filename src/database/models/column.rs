/// Storage type of a column. Bound parameters are cast into this type in SQL,
/// so query-string text and JSON body values can share one binding path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Uuid,
    Json,
    TextArray,
    TimestampArray,
    UuidArray,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Float => "double precision",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Uuid => "uuid",
            ColumnType::Json => "jsonb",
            ColumnType::TextArray => "text[]",
            ColumnType::TimestampArray => "timestamptz[]",
            ColumnType::UuidArray => "uuid[]",
        }
    }

    /// Element type of array columns
    pub fn element(&self) -> Option<ColumnType> {
        match self {
            ColumnType::TextArray => Some(ColumnType::Text),
            ColumnType::TimestampArray => Some(ColumnType::Timestamp),
            ColumnType::UuidArray => Some(ColumnType::Uuid),
            _ => None,
        }
    }

    /// SQL expression turning the bound parameter `placeholder` into this type.
    /// Array values are bound as a JSON array and unpacked server-side.
    pub fn cast_param(&self, placeholder: &str) -> String {
        match self.element() {
            Some(element) => format!(
                "ARRAY(SELECT jsonb_array_elements_text({}::jsonb)::{})",
                placeholder,
                element.sql_type()
            ),
            None => format!("{}::{}", placeholder, self.sql_type()),
        }
    }

    /// Whether comparison operators make sense for this column
    pub fn is_comparable(&self) -> bool {
        !matches!(self, ColumnType::Json) && self.element().is_none()
    }
}

/// One field of a model: its wire name, storage column and access rules.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub field: &'static str,
    pub column: &'static str,
    pub ty: ColumnType,
    /// Never selected into API output (password hashes, reset tokens)
    pub hidden: bool,
    /// Clients may set the value through create/update bodies
    pub writable: bool,
}

impl Column {
    pub const fn new(field: &'static str, column: &'static str, ty: ColumnType) -> Self {
        Self {
            field,
            column,
            ty,
            hidden: false,
            writable: true,
        }
    }

    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub const fn readonly(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.column)
    }
}

/// Table layout of a model
#[derive(Debug)]
pub struct Schema {
    pub table: &'static str,
    pub columns: &'static [Column],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.field == name)
    }

    pub fn by_column(&self, column: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.column == column)
    }

    pub fn visible(&self) -> impl Iterator<Item = &'static Column> {
        self.columns.iter().filter(|c| !c.hidden)
    }

    pub fn quoted_table(&self) -> String {
        format!("\"{}\"", self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SCHEMA: Schema = Schema {
        table: "things",
        columns: &[
            Column::new("id", "id", ColumnType::Uuid).readonly(),
            Column::new("maxGroupSize", "max_group_size", ColumnType::Integer),
            Column::new("secret", "secret", ColumnType::Text).hidden(),
        ],
    };

    #[test]
    fn scalar_params_are_cast() {
        assert_eq!(ColumnType::Float.cast_param("$1"), "$1::double precision");
        assert_eq!(ColumnType::Timestamp.cast_param("$2"), "$2::timestamptz");
    }

    #[test]
    fn array_params_are_unpacked_from_json() {
        assert_eq!(
            ColumnType::UuidArray.cast_param("$3"),
            "ARRAY(SELECT jsonb_array_elements_text($3::jsonb)::uuid)"
        );
    }

    #[test]
    fn schema_lookups() {
        assert_eq!(SCHEMA.field("maxGroupSize").map(|c| c.column), Some("max_group_size"));
        assert_eq!(SCHEMA.by_column("max_group_size").map(|c| c.field), Some("maxGroupSize"));
        assert!(SCHEMA.field("max_group_size").is_none());
        assert_eq!(SCHEMA.visible().count(), 2);
        assert!(!SCHEMA.field("id").unwrap().writable);
    }
}
