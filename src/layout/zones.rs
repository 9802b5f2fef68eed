//! Form-region classification by normalized position

use serde::{Deserialize, Serialize};

/// Named region of a form-like document (tuned for A4 invoices)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    HeaderLeft,
    HeaderRight,
    Buyer,
    /// Side block to the right of the buyer area (password/cipher area)
    Password,
    Items,
    Seller,
    Remarks,
    Footer,
}

impl Zone {
    /// All zones in page order.
    pub const ALL: [Zone; 8] = [
        Zone::HeaderLeft,
        Zone::HeaderRight,
        Zone::Buyer,
        Zone::Password,
        Zone::Items,
        Zone::Seller,
        Zone::Remarks,
        Zone::Footer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::HeaderLeft => "header_left",
            Zone::HeaderRight => "header_right",
            Zone::Buyer => "buyer",
            Zone::Password => "password",
            Zone::Items => "items",
            Zone::Seller => "seller",
            Zone::Remarks => "remarks",
            Zone::Footer => "footer",
        }
    }

    /// Section heading used in zoned text output. Several zones share one.
    pub fn section_title(&self) -> &'static str {
        match self {
            Zone::HeaderLeft | Zone::HeaderRight => "发票信息",
            Zone::Buyer => "购买方",
            Zone::Password => "密码区",
            Zone::Items => "明细",
            Zone::Seller => "销售方",
            Zone::Remarks | Zone::Footer => "备注/其他",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification thresholds, as fractions of page width/height
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneThresholds {
    /// Below this `y` everything is header
    pub header_bottom: f64,
    /// Header split between left and right
    pub header_split_x: f64,
    /// Side block starts at this `x`...
    pub side_block_left: f64,
    /// ...and ends above this `y`
    pub side_block_bottom: f64,
    pub buyer_bottom: f64,
    pub items_bottom: f64,
    /// Seller/remarks band ends here; footer below
    pub seller_bottom: f64,
    /// Seller left of this `x`, remarks right of it
    pub seller_split_x: f64,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            header_bottom: 0.22,
            header_split_x: 0.55,
            side_block_left: 0.58,
            side_block_bottom: 0.56,
            buyer_bottom: 0.40,
            items_bottom: 0.72,
            seller_bottom: 0.93,
            seller_split_x: 0.58,
        }
    }
}

impl ZoneThresholds {
    /// Map a normalized center to its zone. First matching rule wins.
    pub fn zone_for(&self, cx: f64, cy: f64) -> Zone {
        if cy < self.header_bottom {
            if cx >= self.header_split_x {
                Zone::HeaderRight
            } else {
                Zone::HeaderLeft
            }
        } else if cx >= self.side_block_left && cy < self.side_block_bottom {
            Zone::Password
        } else if cy < self.buyer_bottom {
            Zone::Buyer
        } else if cy < self.items_bottom {
            Zone::Items
        } else if cy < self.seller_bottom {
            if cx < self.seller_split_x {
                Zone::Seller
            } else {
                Zone::Remarks
            }
        } else {
            Zone::Footer
        }
    }

    /// Classify an absolute center on a page of the given size.
    ///
    /// Degenerate page sizes are treated as 1 so the result stays total.
    pub fn zone_at(&self, center_x: f64, center_y: f64, page_width: f64, page_height: f64) -> Zone {
        let w = if page_width > 0.0 { page_width } else { 1.0 };
        let h = if page_height > 0.0 { page_height } else { 1.0 };
        self.zone_for(center_x / w, center_y / h)
    }
}

/// [`ZoneThresholds::zone_for`] with the default thresholds.
pub fn zone_for(cx: f64, cy: f64) -> Zone {
    ZoneThresholds::default().zone_for(cx, cy)
}
