// ABOUTME: MySQL to PostgreSQL column type mapping
// ABOUTME: Binary types map to text since payloads are coerced before loading

/// Split a MySQL column type such as `int(11) unsigned` into its base name,
/// the raw argument list and the unsigned flag
fn split_type(declared: &str) -> (String, Option<String>, bool) {
    let lower = declared.trim().to_lowercase();
    let unsigned = lower.split_whitespace().any(|w| w == "unsigned");

    match lower.find('(') {
        Some(open) => {
            let base = lower[..open].trim().to_string();
            let args = lower[open + 1..]
                .rfind(')')
                .map(|close| lower[open + 1..open + 1 + close].to_string());
            (base, args, unsigned)
        }
        None => {
            let base = lower.split_whitespace().next().unwrap_or("").to_string();
            (base, None, unsigned)
        }
    }
}

/// Map a MySQL declared column type to a PostgreSQL column type
pub fn mysql_to_postgres(declared: &str) -> String {
    let (base, args, unsigned) = split_type(declared);

    match base.as_str() {
        // Integer types
        "tinyint" | "smallint" | "year" => "smallint".to_string(),
        "mediumint" => "integer".to_string(),
        "int" | "integer" => {
            if unsigned {
                "bigint".to_string()
            } else {
                "integer".to_string()
            }
        }
        "bigint" => {
            if unsigned {
                "numeric(20,0)".to_string()
            } else {
                "bigint".to_string()
            }
        }

        // Decimal/numeric
        "decimal" | "numeric" | "dec" | "fixed" => match args {
            Some(a) => format!("numeric({})", a.replace(' ', "")),
            None => "numeric".to_string(),
        },

        // Floating point
        "float" => "real".to_string(),
        "double" | "real" => "double precision".to_string(),

        // String types
        "char" | "varchar" => match args {
            Some(a) if a.parse::<u32>().is_ok() => format!("varchar({})", a),
            _ => "text".to_string(),
        },
        "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set" => "text".to_string(),

        // Binary types (coerced to text before loading)
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "bit" => {
            "text".to_string()
        }

        // Date/time types
        "date" => "date".to_string(),
        "datetime" | "timestamp" => match args {
            Some(a) if a.parse::<u32>().is_ok() => format!("timestamp({})", a),
            _ => "timestamp".to_string(),
        },
        "time" => "time".to_string(),

        "json" => "json".to_string(),

        // Default fallback
        _ => "text".to_string(),
    }
}
