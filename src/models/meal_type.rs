use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four fixed meal categories of a day, in day order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Desayuno,
    Almuerzo,
    Merienda,
    Cena,
}

impl MealType {
    /// All meal types in canonical day order. Every day of a week plan
    /// has exactly one slot per entry here.
    pub const ALL: [MealType; 4] = [
        MealType::Desayuno,
        MealType::Almuerzo,
        MealType::Merienda,
        MealType::Cena,
    ];
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MealType::Desayuno => write!(f, "desayuno"),
            MealType::Almuerzo => write!(f, "almuerzo"),
            MealType::Merienda => write!(f, "merienda"),
            MealType::Cena => write!(f, "cena"),
        }
    }
}

impl FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "desayuno" => Ok(MealType::Desayuno),
            "almuerzo" => Ok(MealType::Almuerzo),
            "merienda" => Ok(MealType::Merienda),
            "cena" => Ok(MealType::Cena),
            _ => Err(format!(
                "Invalid meal type '{}'. Valid options: desayuno, almuerzo, merienda, cena",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meal_type_display() {
        assert_eq!(format!("{}", MealType::Desayuno), "desayuno");
        assert_eq!(format!("{}", MealType::Almuerzo), "almuerzo");
        assert_eq!(format!("{}", MealType::Merienda), "merienda");
        assert_eq!(format!("{}", MealType::Cena), "cena");
    }

    #[test]
    fn test_meal_type_from_str() {
        assert_eq!(MealType::from_str("desayuno").unwrap(), MealType::Desayuno);
        assert_eq!(MealType::from_str("ALMUERZO").unwrap(), MealType::Almuerzo);
        assert_eq!(MealType::from_str("Merienda").unwrap(), MealType::Merienda);
        assert_eq!(MealType::from_str("cena").unwrap(), MealType::Cena);
    }

    #[test]
    fn test_meal_type_from_str_invalid() {
        assert!(MealType::from_str("brunch").is_err());
        assert!(MealType::from_str("").is_err());
    }

    #[test]
    fn test_meal_type_all_has_four_entries() {
        assert_eq!(MealType::ALL.len(), 4);
    }

    #[test]
    fn test_meal_type_json_roundtrip() {
        let meal_type = MealType::Almuerzo;
        let json = serde_json::to_string(&meal_type).unwrap();
        assert_eq!(json, "\"almuerzo\"");

        let parsed: MealType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, meal_type);
    }
}
