// Copyright 2026 Edgereach Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! ISO-3166 alpha-2 country code -> continent, covering the documented
//! continent set. Unmapped codes return `None`, which never matches a
//! continent filter.

/// One of the six continents this catalog ever reports.
pub fn infer_continent(country_code: &str) -> Option<&'static str> {
    match country_code {
        "US" | "CA" | "MX" | "GT" | "BZ" | "HN" | "SV" | "NI" | "CR" | "PA" | "CU" | "JM"
        | "HT" | "DO" | "BS" | "TT" => Some("north-america"),

        "BR" | "AR" | "CL" | "CO" | "PE" | "VE" | "EC" | "BO" | "PY" | "UY" | "GY" | "SR" => {
            Some("south-america")
        }

        "GB" | "IE" | "FR" | "DE" | "ES" | "PT" | "IT" | "NL" | "BE" | "LU" | "CH" | "AT"
        | "SE" | "NO" | "DK" | "FI" | "IS" | "PL" | "CZ" | "SK" | "HU" | "RO" | "BG" | "GR"
        | "HR" | "SI" | "RS" | "UA" | "RU" | "BY" | "LT" | "LV" | "EE" | "MT" | "CY" => {
            Some("europe")
        }

        "CN" | "JP" | "KR" | "KP" | "IN" | "PK" | "BD" | "LK" | "NP" | "ID" | "MY" | "SG"
        | "TH" | "VN" | "PH" | "MM" | "KH" | "LA" | "TW" | "HK" | "MO" | "MN" | "KZ" | "UZ"
        | "AE" | "SA" | "IL" | "TR" | "IR" | "IQ" | "JO" | "QA" | "KW" | "BH" | "OM" | "LB" => {
            Some("asia")
        }

        "ZA" | "NG" | "EG" | "KE" | "GH" | "ET" | "TZ" | "UG" | "DZ" | "MA" | "TN" | "LY"
        | "SD" | "CM" | "CI" | "SN" | "ZW" | "ZM" | "MZ" | "AO" | "RW" | "NA" | "BW" => {
            Some("africa")
        }

        "AU" | "NZ" | "FJ" | "PG" | "WS" | "TO" | "VU" | "SB" | "NC" => Some("oceania"),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_documented_continents() {
        assert_eq!(infer_continent("US"), Some("north-america"));
        assert_eq!(infer_continent("BR"), Some("south-america"));
        assert_eq!(infer_continent("DE"), Some("europe"));
        assert_eq!(infer_continent("JP"), Some("asia"));
        assert_eq!(infer_continent("NG"), Some("africa"));
        assert_eq!(infer_continent("AU"), Some("oceania"));
    }

    #[test]
    fn unmapped_code_is_none() {
        assert_eq!(infer_continent("ZZ"), None);
        assert_eq!(infer_continent(""), None);
    }
}
