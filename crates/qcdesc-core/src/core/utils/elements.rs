use phf::{Map, phf_map};

static ATOMIC_NUMBERS: Map<&'static str, u8> = phf_map! {
    "H" => 1, "He" => 2,
    "Li" => 3, "Be" => 4, "B" => 5, "C" => 6, "N" => 7, "O" => 8, "F" => 9, "Ne" => 10,
    "Na" => 11, "Mg" => 12, "Al" => 13, "Si" => 14, "P" => 15, "S" => 16, "Cl" => 17, "Ar" => 18,
    "K" => 19, "Ca" => 20, "Sc" => 21, "Ti" => 22, "V" => 23, "Cr" => 24, "Mn" => 25, "Fe" => 26,
    "Co" => 27, "Ni" => 28, "Cu" => 29, "Zn" => 30, "Ga" => 31, "Ge" => 32, "As" => 33,
    "Se" => 34, "Br" => 35, "Kr" => 36,
    "Rb" => 37, "Sr" => 38, "Y" => 39, "Zr" => 40, "Nb" => 41, "Mo" => 42, "Tc" => 43,
    "Ru" => 44, "Rh" => 45, "Pd" => 46, "Ag" => 47, "Cd" => 48, "In" => 49, "Sn" => 50,
    "Sb" => 51, "Te" => 52, "I" => 53, "Xe" => 54,
};

/// Atomic number of a (case-normalized) element symbol, if known.
pub fn atomic_number(symbol: &str) -> Option<u8> {
    normalize_symbol(symbol).and_then(|s| ATOMIC_NUMBERS.get(s).copied())
}

/// Case-normalizes an element symbol ("cl" / "CL" -> "Cl") and returns the
/// canonical static spelling, or `None` for unknown symbols.
pub fn normalize_symbol(symbol: &str) -> Option<&'static str> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() || trimmed.len() > 2 {
        return None;
    }
    let mut canonical = String::with_capacity(2);
    let mut chars = trimmed.chars();
    canonical.push(chars.next()?.to_ascii_uppercase());
    for c in chars {
        canonical.push(c.to_ascii_lowercase());
    }
    ATOMIC_NUMBERS.get_key(canonical.as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_organic_elements_are_known() {
        assert_eq!(atomic_number("H"), Some(1));
        assert_eq!(atomic_number("C"), Some(6));
        assert_eq!(atomic_number("N"), Some(7));
        assert_eq!(atomic_number("O"), Some(8));
        assert_eq!(atomic_number("Br"), Some(35));
        assert_eq!(atomic_number("I"), Some(53));
    }

    #[test]
    fn symbols_are_case_normalized() {
        assert_eq!(normalize_symbol("cl"), Some("Cl"));
        assert_eq!(normalize_symbol("CL"), Some("Cl"));
        assert_eq!(normalize_symbol(" c "), Some("C"));
    }

    #[test]
    fn unknown_symbols_are_rejected() {
        assert_eq!(normalize_symbol("Xx"), None);
        assert_eq!(normalize_symbol(""), None);
        assert_eq!(normalize_symbol("Carbon"), None);
        assert_eq!(atomic_number("Zz"), None);
    }
}
