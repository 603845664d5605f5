//! Source file and normalization configuration for the type-approval dataset

use super::types::*;

macro_rules! source_url {
    ($file:literal) => {
        concat!(
            "https://opendata.astra.admin.ch/ivzod/2000-Typengenehmigungen_TG_TARGA/",
            "2200-Basisdaten_TG_ab_1995/",
            $file
        )
    };
}

// =============================================================================
// Primary Table
// =============================================================================

pub static CARS: SourceTable = SourceTable {
    name: "cars",
    url: source_url!("TG-Automobil.txt"),
    local_name: "TG-Automobil.txt",
    role: TableRole::Primary,
    requires_fk_precheck: false,
    normalization: &[
        NormalizationRule::new("col_01_fahrzeugart", "lkp_fahrzeugart"),
        NormalizationRule::new("col_02_fahrzeugsubart_code", "lkp_fahrzeugsubart_code"),
        NormalizationRule::new("col_02_fahrzeugsubart", "lkp_fahrzeugsubart"),
        NormalizationRule::new("col_03_fahrzeugklasse", "lkp_fahrzeugklasse"),
        NormalizationRule::new("col_04_marke", "lkp_marken"),
        NormalizationRule::new("col_04_typ", "lkp_typen"),
        NormalizationRule::new("col_06_vorziffer", "lkp_vorziffer"),
        NormalizationRule::new("col_07_karosserieform_code", "lkp_karosserieform_code"),
        NormalizationRule::new("col_07_karosserieform", "lkp_karosserieform"),
        NormalizationRule::new("col_09_eu_gesamtgenehmigung", "lkp_eu_gesamtgenehmigung"),
        NormalizationRule::new("col_10_efko_code", "lkp_efko_code"),
        NormalizationRule::new("col_10_hersteller", "lkp_hersteller"),
        NormalizationRule::new("col_11_herstellerplakette", "lkp_herstellerplakette"),
        NormalizationRule::new("col_12_fahrgestellnummer", "lkp_fahrgestellnummer_struktur"),
        NormalizationRule::new("col_14_achsen_raeder", "lkp_achsen_raeder"),
        NormalizationRule::new("col_15_federung", "lkp_federung"),
        NormalizationRule::new("col_16_lenkung", "lkp_lenkung"),
        NormalizationRule::new("col_17_achsantrieb", "lkp_achsantrieb"),
        NormalizationRule::new("col_18_getriebe_1", "lkp_getriebe_art"),
        NormalizationRule::new("col_18_zuordnung_1", "lkp_getriebe_zuordnung"),
        NormalizationRule::new("col_18_getriebe_2", "lkp_getriebe_art"),
        NormalizationRule::new("col_18_zuordnung_2", "lkp_getriebe_zuordnung"),
        NormalizationRule::new("col_18_getriebe_3", "lkp_getriebe_art"),
        NormalizationRule::new("col_18_zuordnung_3", "lkp_getriebe_zuordnung"),
        NormalizationRule::new("col_18_getriebe_4", "lkp_getriebe_art"),
        NormalizationRule::new("col_18_zuordnung_4", "lkp_getriebe_zuordnung"),
        NormalizationRule::new("col_20_betriebsbremse_z1", "lkp_bremssystem_komponente"),
        NormalizationRule::new("col_20_betriebsbremse_z2", "lkp_bremssystem_komponente"),
        NormalizationRule::new("col_20_betriebsbremse_z3", "lkp_bremssystem_komponente"),
        NormalizationRule::new("col_21_hilfsbremse_z1", "lkp_bremssystem_komponente"),
        NormalizationRule::new("col_21_hilfsbremse_z2", "lkp_bremssystem_komponente"),
        NormalizationRule::new("col_22_feststellbremse", "lkp_bremssystem_komponente"),
        NormalizationRule::new("col_25_motor_marke", "lkp_motor_marken"),
        NormalizationRule::new("col_25_motor_typ", "lkp_motor_typen"),
        NormalizationRule::new("col_26_bauart", "lkp_motor_bauart"),
        NormalizationRule::new("col_26_bauart_treibstoff", "lkp_treibstoffe"),
        NormalizationRule::new("col_30_abgasreinigung", "lkp_abgasreinigung_systeme"),
        NormalizationRule::new("col_31_schalldaempfer_1_art", "lkp_schalldaempfer_art"),
        NormalizationRule::new("col_31_schalldaempfer_1_bez", "lkp_schalldaempfer_bezeichnung"),
        NormalizationRule::new("col_32_schalldaempfer_2_art", "lkp_schalldaempfer_art"),
        NormalizationRule::new("col_32_schalldaempfer_2_bez", "lkp_schalldaempfer_bezeichnung"),
        NormalizationRule::new("col_33_schalldaempfer_3_art", "lkp_schalldaempfer_art"),
        NormalizationRule::new("col_33_schalldaempfer_3_bez", "lkp_schalldaempfer_bezeichnung"),
        NormalizationRule::new("col_34_motorkennzeichen", "lkp_motorkennzeichen_art"),
        NormalizationRule::new("col_34_motorkennzeichen_anbringungsort", "lkp_anbringungsorte"),
        NormalizationRule::new("col_35_geraeuschdaempfung_z1", "lkp_daempfungsmassnahme"),
        NormalizationRule::new("col_35_geraeuschdaempfung_z2", "lkp_daempfungsmassnahme"),
        NormalizationRule::new("col_35_geraeuschdaempfung_z3", "lkp_daempfungsmassnahme"),
        NormalizationRule::new("col_35_geraeuschdaempfung_z4", "lkp_daempfungsmassnahme"),
        NormalizationRule::new("col_38_anzahl_tueren", "lkp_anzahl_tueren"),
        NormalizationRule::new("col_39_rueckspiegel", "lkp_rueckspiegel_art"),
        NormalizationRule::new("col_55_keine_dachlast", "lkp_dachlast_status"),
        NormalizationRule::new("col_56_keine_anhaengelast", "lkp_anhaengelast_status"),
        NormalizationRule::new("col_69_reifen_felgen", "lkp_reifen_felgen_kombination"),
        NormalizationRule::new("col_70_reifen_felgen", "lkp_reifen_felgen_kombination"),
        NormalizationRule::new("col_71_reifen_felgen", "lkp_reifen_felgen_kombination"),
        NormalizationRule::new("bemerkungen_z1", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z2", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z3", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z4", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z5", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z6", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z7", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z8", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z9", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z10", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z11", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z12", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z13", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z14", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z15", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z16", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z17", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z18", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z19", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z20", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z21", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z22", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z23", "lkp_bemerkungen"),
        NormalizationRule::new("bemerkungen_z24", "lkp_bemerkungen"),
    ],
};

// =============================================================================
// Dependent Tables (keyed by the primary table's tg_code)
// =============================================================================

pub static EMISSIONS: SourceTable = SourceTable {
    name: "emissions",
    url: source_url!("emissionen.txt"),
    local_name: "emissionen.txt",
    role: TableRole::Dependent,
    requires_fk_precheck: true,
    normalization: &[
        NormalizationRule::new("marke", "lkp_marken"),
        NormalizationRule::new("typ", "lkp_typen"),
        NormalizationRule::new("getriebe", "lkp_getriebe_art"),
        NormalizationRule::new("motormarke", "lkp_motor_marken"),
        NormalizationRule::new("motortyp", "lkp_motor_typen"),
        NormalizationRule::new("bauart", "lkp_motor_bauart"),
        NormalizationRule::new("treibstoff", "lkp_treibstoffe"),
        NormalizationRule::new("abgasreinigung", "lkp_abgasreinigung_systeme"),
        NormalizationRule::new("anzahl_achsen_raeder", "lkp_achsen_raeder"),
        NormalizationRule::new("antrieb", "lkp_achsantrieb"),
        NormalizationRule::new("abgascode", "lkp_abgascodes"),
        NormalizationRule::new("emissionscode", "lkp_emissionscodes"),
        NormalizationRule::new("geraeuschcode", "lkp_geraeuschcodes"),
        NormalizationRule::new("bemerkung", "lkp_bemerkungen"),
    ],
};

pub static CONSUMPTION: SourceTable = SourceTable {
    name: "consumption",
    url: source_url!("verbrauch.txt"),
    local_name: "verbrauch.txt",
    role: TableRole::Dependent,
    requires_fk_precheck: true,
    normalization: &[
        NormalizationRule::new("marke", "lkp_marken"),
        NormalizationRule::new("typ", "lkp_typen"),
        NormalizationRule::new("treibstoff", "lkp_treibstoffe"),
        NormalizationRule::new("getriebe", "lkp_getriebe_art"),
        NormalizationRule::new("hinweis", "lkp_hinweise"),
        NormalizationRule::new("energieeffizienzkategorie", "lkp_energieeffizienz_kategorie"),
    ],
};

/// All configured sources, in configuration order
pub static ALL_SOURCES: &[&SourceTable] = &[&CARS, &EMISSIONS, &CONSUMPTION];

/// Sanitized primary-table column holding the brand
pub const BRAND_COLUMN: &str = "col_04_marke";

/// Sanitized primary-table column holding the model designation
pub const MODEL_COLUMN: &str = "col_04_typ";

/// Primary-table column holding the approval date as YYYYMMDD text
pub const APPROVAL_DATE_COLUMN: &str = "typengenehmigung_erteilt";

/// Distinct lookup tables referenced by the given sources, sorted by name
pub fn lookup_table_names(sources: &[&SourceTable]) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = sources
        .iter()
        .flat_map(|s| s.lookup_tables())
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_primary() {
        let primaries: Vec<_> = ALL_SOURCES.iter().filter(|s| s.is_primary()).collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].name, "cars");
    }

    #[test]
    fn test_dependents_require_precheck() {
        for source in ALL_SOURCES.iter().filter(|s| !s.is_primary()) {
            assert!(source.requires_fk_precheck, "{} should pre-check", source.name);
        }
    }

    #[test]
    fn test_brand_lookup_shared_across_files() {
        let brand = CARS.lookup_for(BRAND_COLUMN).unwrap();
        assert_eq!(EMISSIONS.lookup_for("marke"), Some(brand));
        assert_eq!(CONSUMPTION.lookup_for("marke"), Some(brand));
    }

    #[test]
    fn test_lookup_table_names_sorted_and_unique() {
        let names = lookup_table_names(ALL_SOURCES);
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(names, sorted);
        assert!(names.contains(&"lkp_marken"));
        assert!(names.contains(&"lkp_energieeffizienz_kategorie"));
    }

    #[test]
    fn test_urls_point_at_local_names() {
        for source in ALL_SOURCES {
            assert!(source.url.starts_with("https://opendata.astra.admin.ch/"));
            assert!(source.url.ends_with(source.local_name));
        }
    }
}
