// orderflow/src/carrier/package.rs
use super::types::{BookingItem, BookingPayload, Package, PickupOrigin, ShipmentDirection};
use crate::model::{Address, OrderLine};
use rust_decimal::Decimal;

const DEFAULT_ITEM_WEIGHT_KG: Decimal = Decimal::from_parts(5, 0, 0, false, 1);
const MIN_PACKAGE_WEIGHT_KG: Decimal = Decimal::from_parts(5, 0, 0, false, 1);
const DEFAULT_LENGTH_CM: Decimal = Decimal::from_parts(30, 0, 0, false, 0);
const DEFAULT_BREADTH_CM: Decimal = Decimal::from_parts(25, 0, 0, false, 0);
const DEFAULT_HEIGHT_CM: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// One box for all lines: weights add up, footprint is the largest item,
/// heights stack.
pub fn package_for(lines: &[OrderLine]) -> Package {
  let mut weight = Decimal::ZERO;
  let mut length = Decimal::ZERO;
  let mut breadth = Decimal::ZERO;
  let mut height = Decimal::ZERO;

  for line in lines {
    let units = Decimal::from(line.shipped_quantity());
    weight += line.unit_weight_kg.unwrap_or(DEFAULT_ITEM_WEIGHT_KG) * units;
    if let Some(dims) = &line.dims {
      length = length.max(dims.length_cm);
      breadth = breadth.max(dims.breadth_cm);
      height += dims.height_cm * units;
    }
  }

  Package {
    weight_kg: weight.max(MIN_PACKAGE_WEIGHT_KG),
    length_cm: if length > Decimal::ZERO { length } else { DEFAULT_LENGTH_CM },
    breadth_cm: if breadth > Decimal::ZERO { breadth } else { DEFAULT_BREADTH_CM },
    height_cm: if height > Decimal::ZERO { height } else { DEFAULT_HEIGHT_CM },
  }
}

pub fn booking_payload(
  reference: String,
  direction: ShipmentDirection,
  origin: &PickupOrigin,
  customer: &Address,
  lines: &[OrderLine],
  courier_id: Option<u64>,
) -> BookingPayload {
  let items: Vec<BookingItem> = lines
    .iter()
    .map(|l| BookingItem {
      name: format!("{} ({})", l.item_name, l.size),
      sku: l.sku.clone(),
      units: l.shipped_quantity(),
      selling_price: l.unit_price,
    })
    .collect();
  let sub_total = lines.iter().map(OrderLine::line_total).sum();

  BookingPayload {
    reference,
    direction,
    pickup_location: origin.location_name.clone(),
    pickup_pincode: origin.pincode.clone(),
    customer: customer.clone(),
    items,
    sub_total,
    package: package_for(lines),
    courier_id,
  }
}
