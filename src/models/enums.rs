
/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            /// Every variant, in declaration order.
            pub fn all() -> &'static [Self] {
                &[$(Self::$variant),+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::db::DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err($crate::db::DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

pub(crate) use str_enum;

str_enum!(LevelOfCare {
    Supervisory => "Supervisory Care",
    Personal => "Personal Care",
    Directed => "Directed Care",
});

str_enum!(MedicationKind {
    Scheduled => "scheduled",
    Prn => "prn",
    Controlled => "controlled",
});

str_enum!(TimeSlot {
    Morning => "morning",
    Noon => "noon",
    Evening => "evening",
    Night => "night",
});

impl TimeSlot {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Morning => "Morning",
            Self::Noon => "Noon",
            Self::Evening => "Evening",
            Self::Night => "Night",
        }
    }
}

str_enum!(MedicationForm {
    Pill => "pill",
    Liquid => "liquid",
});

str_enum!(VolumeUnit {
    Millilitre => "mL",
    Litre => "L",
    FluidOunce => "oz",
});

impl VolumeUnit {
    /// Millilitres per one unit.
    pub fn millilitres(&self) -> f64 {
        match self {
            Self::Millilitre => 1.0,
            Self::Litre => 1000.0,
            Self::FluidOunce => 29.5735,
        }
    }
}

str_enum!(Role {
    Admin => "admin",
    User => "user",
});

str_enum!(DayOfWeek {
    Monday => "Monday",
    Tuesday => "Tuesday",
    Wednesday => "Wednesday",
    Thursday => "Thursday",
    Friday => "Friday",
    Saturday => "Saturday",
    Sunday => "Sunday",
});

impl From<chrono::Weekday> for DayOfWeek {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }
}

str_enum!(BackupFrequency {
    Daily => "Daily",
    Weekly => "Weekly",
});
