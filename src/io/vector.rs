use crate::types::{decimal_string, FixtureError, FixtureResult};
use chrono::{DateTime, FixedOffset, NaiveDate};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{
    FieldDefn, FieldValue, Geometry, LayerAccess, OGRFieldType, OGRwkbGeometryType,
};
use gdal::{Dataset, DriverManager, LayerOptions};
use std::path::Path;

/// One attribute cell
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    IntegerList(Vec<i64>),
    RealList(Vec<f64>),
    TextList(Vec<String>),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Text rendering used when a column is coerced to strings
    pub fn render(&self) -> Option<String> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Integer(v) => Some(v.to_string()),
            AttributeValue::Real(v) => Some(decimal_string(*v)),
            AttributeValue::Text(v) => Some(v.clone()),
            AttributeValue::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
            AttributeValue::DateTime(v) => Some(v.to_rfc3339()),
            AttributeValue::IntegerList(v) => Some(render_list(v)),
            AttributeValue::RealList(v) => {
                let items: Vec<String> = v.iter().map(|x| decimal_string(*x)).collect();
                Some(render_list(&items))
            }
            AttributeValue::TextList(v) => Some(render_list(v)),
        }
    }

    fn from_field(value: Option<FieldValue>) -> Self {
        match value {
            None => AttributeValue::Null,
            Some(FieldValue::IntegerValue(v)) => AttributeValue::Integer(v as i64),
            Some(FieldValue::Integer64Value(v)) => AttributeValue::Integer(v),
            Some(FieldValue::RealValue(v)) => AttributeValue::Real(v),
            Some(FieldValue::StringValue(v)) => AttributeValue::Text(v),
            Some(FieldValue::DateValue(v)) => AttributeValue::Date(v),
            Some(FieldValue::DateTimeValue(v)) => AttributeValue::DateTime(v),
            Some(FieldValue::IntegerListValue(v)) => {
                AttributeValue::IntegerList(v.into_iter().map(i64::from).collect())
            }
            Some(FieldValue::Integer64ListValue(v)) => AttributeValue::IntegerList(v),
            Some(FieldValue::RealListValue(v)) => AttributeValue::RealList(v),
            Some(FieldValue::StringListValue(v)) => AttributeValue::TextList(v),
        }
    }
}

fn render_list<T: std::fmt::Display>(values: &[T]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}

/// Storage class of a column, derived from the values it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    /// Anything that is not uniformly numeric
    Object,
}

/// Named attribute column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<AttributeValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self { name: name.into(), values }
    }

    /// Integer when every non-null value is an integer, real when every
    /// non-null value is numeric, object otherwise. All-null columns are
    /// objects.
    pub fn kind(&self) -> ColumnKind {
        let mut kind = None;
        for value in self.values.iter().filter(|v| !v.is_null()) {
            kind = match (kind, value) {
                (None | Some(ColumnKind::Integer), AttributeValue::Integer(_)) => {
                    Some(ColumnKind::Integer)
                }
                (None | Some(ColumnKind::Integer) | Some(ColumnKind::Real), AttributeValue::Real(_))
                | (Some(ColumnKind::Real), AttributeValue::Integer(_)) => Some(ColumnKind::Real),
                _ => return ColumnKind::Object,
            };
        }
        kind.unwrap_or(ColumnKind::Object)
    }

    fn field_type(&self) -> OGRFieldType::Type {
        match self.kind() {
            ColumnKind::Integer => OGRFieldType::OFTInteger64,
            ColumnKind::Real => OGRFieldType::OFTReal,
            ColumnKind::Object => OGRFieldType::OFTString,
        }
    }

    /// Widest rendered value in bytes, at least one
    pub fn text_width(&self) -> usize {
        self.values
            .iter()
            .filter_map(AttributeValue::render)
            .map(|text| text.len())
            .max()
            .unwrap_or(0)
            .max(1)
    }

    fn field_value(&self, kind: ColumnKind, row: usize) -> Option<FieldValue> {
        let value = self.values.get(row)?;
        match (kind, value) {
            (_, AttributeValue::Null) => None,
            (ColumnKind::Integer, AttributeValue::Integer(v)) => Some(FieldValue::Integer64Value(*v)),
            (ColumnKind::Real, AttributeValue::Integer(v)) => Some(FieldValue::RealValue(*v as f64)),
            (ColumnKind::Real, AttributeValue::Real(v)) => Some(FieldValue::RealValue(*v)),
            (_, other) => other.render().map(FieldValue::StringValue),
        }
    }
}

/// In-memory vector layer: geometries as WKB plus attribute columns
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    pub layer_name: String,
    /// WKT of the layer's spatial reference
    pub srs_wkt: Option<String>,
    pub geometry_type: Option<OGRwkbGeometryType::Type>,
    pub geometries: Vec<Option<Vec<u8>>>,
    pub columns: Vec<Column>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Rewrite every object column as uniform text, leaving nulls and
    /// numeric columns untouched. Returns the names of the coerced columns.
    pub fn coerce_object_columns(&mut self) -> Vec<String> {
        let mut coerced = Vec::new();
        for column in &mut self.columns {
            if column.kind() != ColumnKind::Object {
                continue;
            }
            for value in &mut column.values {
                if let Some(text) = value.render() {
                    *value = AttributeValue::Text(text);
                }
            }
            coerced.push(column.name.clone());
        }
        log::debug!("Coerced object columns to text: {:?}", coerced);
        coerced
    }
}

/// OGR driver used for a destination path, chosen by extension
pub fn driver_for_path(path: &Path) -> FixtureResult<&'static str> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "shp" => Ok("ESRI Shapefile"),
        "gpkg" => Ok("GPKG"),
        "geojson" | "json" => Ok("GeoJSON"),
        _ => Err(FixtureError::InvalidFormat(format!(
            "No vector driver for {}",
            path.display()
        ))),
    }
}

/// Read the first layer of a vector file
pub fn read_feature_table<P: AsRef<Path>>(path: P) -> FixtureResult<FeatureTable> {
    log::info!("Reading outlines from {}", path.as_ref().display());

    let dataset = Dataset::open(path.as_ref())?;
    let mut layer = dataset.layer(0)?;

    let field_names: Vec<String> = layer.defn().fields().map(|f| f.name()).collect();
    let srs_wkt = match layer.spatial_ref() {
        Some(srs) => Some(srs.to_wkt()?),
        None => None,
    };
    let layer_name = layer.name();

    let mut table = FeatureTable {
        layer_name,
        srs_wkt,
        geometry_type: None,
        geometries: Vec::new(),
        columns: field_names
            .iter()
            .map(|name| Column::new(name.clone(), Vec::new()))
            .collect(),
    };

    for feature in layer.features() {
        let wkb = match feature.geometry() {
            Some(geometry) => {
                if table.geometry_type.is_none() {
                    table.geometry_type = Some(geometry.geometry_type());
                }
                Some(geometry.wkb()?)
            }
            None => None,
        };
        table.geometries.push(wkb);

        for column in &mut table.columns {
            let value = feature.field(&column.name)?;
            column.values.push(AttributeValue::from_field(value));
        }
    }

    log::debug!(
        "Read {} features with {} attribute columns",
        table.len(),
        table.columns.len()
    );
    Ok(table)
}

/// Write a feature table with the driver matching the destination extension
pub fn write_feature_table<P: AsRef<Path>>(table: &FeatureTable, path: P) -> FixtureResult<()> {
    let path = path.as_ref();
    let driver = DriverManager::get_driver_by_name(driver_for_path(path)?)?;

    remove_vector_dataset(path)?;

    let srs = match &table.srs_wkt {
        Some(wkt) => Some(SpatialRef::from_wkt(wkt)?),
        None => None,
    };
    let layer_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| table.layer_name.clone());

    let mut dataset = driver.create_vector_only(path)?;
    let mut layer = dataset.create_layer(LayerOptions {
        name: &layer_name,
        srs: srs.as_ref(),
        ty: table.geometry_type.unwrap_or(OGRwkbGeometryType::wkbUnknown),
        options: None,
    })?;

    for column in &table.columns {
        let field = FieldDefn::new(&column.name, column.field_type())?;
        // unset widths fall back to the driver default
        if column.kind() == ColumnKind::Object {
            field.set_width(column.text_width() as i32);
        }
        field.add_to_layer(&layer)?;
    }

    let kinds: Vec<ColumnKind> = table.columns.iter().map(Column::kind).collect();
    for (row, wkb) in table.geometries.iter().enumerate() {
        let geometry = match wkb {
            Some(wkb) => Geometry::from_wkb(wkb)?,
            None => Geometry::empty(table.geometry_type.unwrap_or(OGRwkbGeometryType::wkbUnknown))?,
        };

        let mut names = Vec::new();
        let mut values = Vec::new();
        for (column, kind) in table.columns.iter().zip(&kinds) {
            if let Some(value) = column.field_value(*kind, row) {
                names.push(column.name.as_str());
                values.push(value);
            }
        }
        layer.create_feature_fields(geometry, &names, &values)?;
    }

    log::debug!("Wrote {} features to {}", table.len(), path.display());
    Ok(())
}

/// Drivers refuse to create over an existing dataset, so clear the target
/// and, for shapefiles, its sidecar files.
fn remove_vector_dataset(path: &Path) -> FixtureResult<()> {
    let is_shapefile = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"));
    let sidecars: &[&str] = if is_shapefile {
        &["shp", "shx", "dbf", "prj", "cpg", "qix"]
    } else {
        &[]
    };

    if path.exists() {
        std::fs::remove_file(path)?;
    }
    for extension in sidecars {
        let sidecar = path.with_extension(extension);
        if sidecar.exists() {
            std::fs::remove_file(sidecar)?;
        }
    }
    Ok(())
}

/// Read outlines, coerce object columns to text and persist them
pub fn transform_outlines<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
) -> FixtureResult<FeatureTable> {
    let mut table = read_feature_table(input_path)?;
    table.coerce_object_columns();
    write_feature_table(&table, output_path.as_ref())?;
    log::info!("Saved {}", output_path.as_ref().display());
    Ok(table)
}
