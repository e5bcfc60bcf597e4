// Copyright @yucwang 2026

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::core::emitter::LightParameters;
use crate::core::error::{Result, VolumeError};
use crate::core::params::{RayMarchParameters, WindowingParameters};
use crate::core::scene::VolumeScene;
use crate::core::sensor::Sensor;
use crate::core::transfer_function::{ControlPoint, TransferFunction};
use crate::core::volume::Dimensions;
use crate::integrators::illumination::IlluminationSettings;
use crate::io::header::{ByteOrder, ElementType, VolumeHeader};
use crate::io::packer::{Normalization, OutputPrecision, PackOptions};
use crate::math::aabb::AABB;
use crate::math::constants::{Float, Vector3f, Vector4f};
use crate::math::plane::ClipPlane;
use crate::sensors::orthographic::OrthographicCamera;
use crate::sensors::perspective::PerspectiveCamera;
use crate::volumes::density_volume::DensityVolume;
use crate::volumes::VolumeFilterMode;

const DEFAULT_FOV_DEGREES: Float = 40.0;
const DEFAULT_RESOLUTION: usize = 512;

/// Layout of a headerless `.raw` payload.
#[derive(Clone, Debug, PartialEq)]
pub struct RawLayout {
    pub dimensions: Dimensions,
    pub element_type: ElementType,
    pub byte_order: ByteOrder,
    pub spacing: Vector3f,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VolumeSource {
    pub path: PathBuf,
    pub raw: Option<RawLayout>,
    pub options: PackOptions,
}

impl VolumeSource {
    /// Loads the dataset into `scene` and makes it current.
    pub fn load_into(&self, scene: &VolumeScene) -> Result<Arc<DensityVolume>> {
        match &self.raw {
            Some(raw) => {
                let header = VolumeHeader::raw(self.path.clone(), raw.dimensions, raw.element_type,
                                               raw.byte_order, raw.spacing)?;
                scene.load_from_header(header, self.options)
            }
            None => scene.load_volume(&self.path, self.options),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective { fov_degrees: Float },
    /// `scale` is half the film height in world units.
    Orthographic { scale: Float },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LookAt {
    pub origin: Vector3f,
    pub target: Vector3f,
    pub up: Vector3f,
}

impl LookAt {
    /// Rejects views that leave the camera basis undefined: coincident
    /// origin and target, or an `up` parallel to the view direction.
    pub fn validate(&self) -> Result<()> {
        let forward = self.target - self.origin;
        if !(forward.norm() > 1e-6) {
            return Err(VolumeError::invalid("lookat.target", "target coincides with origin"));
        }
        let side = forward.normalize().cross(&self.up);
        if !(side.norm() > 1e-6 * self.up.norm().max(1.0)) {
            return Err(VolumeError::invalid("lookat.up", "up is parallel to the view direction"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSettings {
    pub projection: Projection,
    /// Missing means framed on the volume.
    pub look_at: Option<LookAt>,
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub volume: VolumeSource,
    pub camera: Option<CameraSettings>,
    pub width: usize,
    pub height: usize,
    pub raymarch: RayMarchParameters,
    pub illumination: IlluminationSettings,
    pub transfer_function: TransferFunction,
    /// Every emitter in document order; one default light when none is given.
    pub lights: Vec<LightParameters>,
    pub background: Vector4f,
}

impl RenderSettings {
    /// Camera for a volume occupying `bounds`.
    pub fn build_sensor(&self, bounds: &AABB) -> Box<dyn Sensor> {
        let camera = self.camera.unwrap_or(CameraSettings {
            projection: Projection::Perspective { fov_degrees: DEFAULT_FOV_DEGREES },
            look_at: None,
        });
        match (camera.projection, camera.look_at) {
            (Projection::Perspective { fov_degrees }, Some(l)) => Box::new(PerspectiveCamera::new(
                l.origin, l.target, l.up, fov_degrees.to_radians(), self.width, self.height,
            )),
            (Projection::Perspective { fov_degrees }, None) => Box::new(PerspectiveCamera::framing(
                bounds, fov_degrees.to_radians(), self.width, self.height,
            )),
            (Projection::Orthographic { scale }, Some(l)) => Box::new(OrthographicCamera::new(
                l.origin, l.target, l.up, scale, self.width, self.height,
            )),
            (Projection::Orthographic { scale }, None) => {
                let center = bounds.center();
                let origin = center + Vector3f::new(0.0, 0.0, bounds.diagnal().norm());
                Box::new(OrthographicCamera::new(
                    origin, center, Vector3f::new(0.0, 1.0, 0.0), scale, self.width, self.height,
                ))
            }
        }
    }
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<RenderSettings> {
    let path = path.as_ref();
    let xml = fs::read_to_string(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_settings(&xml, base_dir)
}

pub fn parse_settings(xml: &str, base_dir: &Path) -> Result<RenderSettings> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut builder = SettingsBuilder::new(base_dir);

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let attrs = attributes(&e)?;
                builder.open(e.name().as_ref(), &attrs)?;
            }
            Ok(Event::Empty(e)) => {
                let attrs = attributes(&e)?;
                builder.open(e.name().as_ref(), &attrs)?;
                builder.close(e.name().as_ref())?;
            }
            Ok(Event::End(e)) => builder.close(e.name().as_ref())?,
            Ok(_) => {}
            Err(e) => {
                return Err(VolumeError::Settings(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
        buf.clear();
    }

    builder.finish()
}

/// Event-driven accumulator; `open`/`close` mirror start and end tags.
struct SettingsBuilder {
    base_dir: PathBuf,

    in_volume: bool,
    in_sensor: bool,
    in_film: bool,
    in_transform: bool,
    in_raymarch: bool,
    in_transfer_function: bool,
    in_emitter: bool,

    volume_path: Option<PathBuf>,
    normalization: Option<String>,
    window_min: Option<f64>,
    window_max: Option<f64>,
    precision: Option<String>,
    chunk_bytes: Option<usize>,
    raw_dimensions: Option<Dimensions>,
    raw_element_type: Option<ElementType>,
    raw_big_endian: bool,
    raw_spacing: Option<Vector3f>,

    sensor_type: Option<String>,
    fov_degrees: Option<Float>,
    scale: Option<Float>,
    look_at: Option<LookAt>,
    camera: Option<CameraSettings>,
    width: Option<usize>,
    height: Option<usize>,

    params: RayMarchParameters,
    illumination: IlluminationSettings,
    points: Vec<ControlPoint>,
    has_transfer_function: bool,

    emitter_type: Option<String>,
    direction: Option<Vector3f>,
    position: Option<Vector3f>,
    intensity: Option<Float>,
    lights: Vec<LightParameters>,

    background: Vector4f,
}

impl SettingsBuilder {
    fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            in_volume: false,
            in_sensor: false,
            in_film: false,
            in_transform: false,
            in_raymarch: false,
            in_transfer_function: false,
            in_emitter: false,
            volume_path: None,
            normalization: None,
            window_min: None,
            window_max: None,
            precision: None,
            chunk_bytes: None,
            raw_dimensions: None,
            raw_element_type: None,
            raw_big_endian: false,
            raw_spacing: None,
            sensor_type: None,
            fov_degrees: None,
            scale: None,
            look_at: None,
            camera: None,
            width: None,
            height: None,
            params: RayMarchParameters::default(),
            illumination: IlluminationSettings::default(),
            points: Vec::new(),
            has_transfer_function: false,
            emitter_type: None,
            direction: None,
            position: None,
            intensity: None,
            lights: Vec::new(),
            background: Vector4f::zeros(),
        }
    }

    fn open(&mut self, tag: &[u8], attrs: &HashMap<String, String>) -> Result<()> {
        match tag {
            b"volume" => {
                self.in_volume = true;
                if let Some(filename) = attrs.get("filename") {
                    self.volume_path = Some(self.resolve_path(filename));
                }
            }
            b"sensor" => {
                self.in_sensor = true;
                let sensor_type = attrs.get("type").map(String::as_str).unwrap_or("perspective");
                if sensor_type != "perspective" && sensor_type != "orthographic" {
                    return Err(VolumeError::Settings(format!("unsupported sensor: {}", sensor_type)));
                }
                self.sensor_type = Some(sensor_type.to_string());
            }
            b"film" => {
                if self.in_sensor {
                    self.in_film = true;
                }
            }
            b"transform" => {
                if self.in_sensor {
                    self.in_transform = attrs.get("name").map_or(true, |name| name == "to_world");
                }
            }
            b"lookat" => {
                if self.in_sensor && self.in_transform {
                    let look_at = LookAt {
                        origin: parse_vec3(required(attrs, "lookat.origin", "origin")?)?,
                        target: parse_vec3(required(attrs, "lookat.target", "target")?)?,
                        up: match attrs.get("up") {
                            Some(up) => parse_vec3(up)?,
                            None => Vector3f::new(0.0, 1.0, 0.0),
                        },
                    };
                    look_at.validate()?;
                    self.look_at = Some(look_at);
                }
            }
            b"raymarch" => self.in_raymarch = true,
            b"windowing" => {
                if self.in_raymarch {
                    let defaults = WindowingParameters::default();
                    self.params.windowing = WindowingParameters {
                        center: optional(attrs, "center", parse_float)?.unwrap_or(defaults.center),
                        width: optional(attrs, "width", parse_float)?.unwrap_or(defaults.width),
                        low_cutoff: optional(attrs, "low_cutoff", parse_bool)?.unwrap_or(defaults.low_cutoff),
                        high_cutoff: optional(attrs, "high_cutoff", parse_bool)?.unwrap_or(defaults.high_cutoff),
                    };
                }
            }
            b"clip_plane" => {
                if self.in_raymarch {
                    self.params.clip_planes.push(parse_clip_plane(attrs)?);
                }
            }
            b"illumination" => {
                self.illumination = IlluminationSettings {
                    half_resolution: optional(attrs, "half_resolution", parse_bool)?.unwrap_or(false),
                    step_size: optional(attrs, "step_size", parse_float)?,
                };
            }
            b"transfer_function" => {
                self.in_transfer_function = true;
                self.has_transfer_function = true;
                self.points.clear();
            }
            b"emitter" => {
                self.in_emitter = true;
                self.emitter_type = Some(required(attrs, "emitter.type", "type")?.clone());
                self.direction = None;
                self.position = None;
                self.intensity = None;
            }
            b"background" => {
                self.background = parse_vec4(required(attrs, "background.rgba", "rgba")?)?;
            }
            b"point" if self.in_transfer_function => {
                let value = parse_float(required(attrs, "point.value", "value")?)?;
                let rgba = parse_vec4(required(attrs, "point.rgba", "rgba")?)?;
                self.points.push(ControlPoint::new(value, rgba));
            }
            b"float" | b"integer" | b"boolean" | b"string" | b"vector" | b"point" => {
                let name = required(attrs, "property.name", "name")?;
                let value = required(attrs, "property.value", "value")?;
                self.property(name, value)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn property(&mut self, name: &str, value: &str) -> Result<()> {
        if self.in_volume {
            match name {
                "normalization" => self.normalization = Some(value.to_string()),
                "window_min" => self.window_min = Some(parse_f64(value)?),
                "window_max" => self.window_max = Some(parse_f64(value)?),
                "precision" => self.precision = Some(value.to_string()),
                "chunk_bytes" => self.chunk_bytes = Some(parse_usize(value)?),
                "dimensions" => {
                    let dims = parse_list::<usize>(value, 3)?;
                    self.raw_dimensions = Some(Dimensions::new(dims[0], dims[1], dims[2]));
                }
                "element_type" => self.raw_element_type = Some(ElementType::from_met(value)?),
                "big_endian" => self.raw_big_endian = parse_bool(value)?,
                "spacing" => self.raw_spacing = Some(parse_vec3(value)?),
                _ => log::warn!("Ignoring volume property '{}'.", name),
            }
        } else if self.in_film {
            match name {
                "width" => self.width = Some(parse_usize(value)?),
                "height" => self.height = Some(parse_usize(value)?),
                _ => log::warn!("Ignoring film property '{}'.", name),
            }
        } else if self.in_sensor {
            match name {
                "fov" => self.fov_degrees = Some(parse_float(value)?),
                "scale" => self.scale = Some(parse_float(value)?),
                _ => log::warn!("Ignoring sensor property '{}'.", name),
            }
        } else if self.in_raymarch {
            let params = &mut self.params;
            match name {
                "step_size" => params.step_size = parse_float(value)?,
                "illumination" => params.illumination_enabled = parse_bool(value)?,
                "early_termination" => params.early_termination_opacity = parse_float(value)?,
                "opacity_unit_length" => params.opacity_unit_length = parse_float(value)?,
                "ambient" => params.ambient = parse_float(value)?,
                "filter" => {
                    params.filter_mode = VolumeFilterMode::from_name(value)
                        .ok_or_else(|| VolumeError::Settings(format!("unknown filter: {}", value)))?
                }
                "jitter" => params.jitter = parse_bool(value)?,
                "seed" => params.seed = parse_u64(value)?,
                "max_steps" => params.max_steps = parse_usize(value)?,
                _ => log::warn!("Ignoring raymarch property '{}'.", name),
            }
        } else if self.in_emitter {
            match name {
                "direction" => self.direction = Some(parse_vec3(value)?),
                "position" => self.position = Some(parse_vec3(value)?),
                "intensity" => self.intensity = Some(parse_float(value)?),
                _ => log::warn!("Ignoring emitter property '{}'.", name),
            }
        }
        Ok(())
    }

    fn close(&mut self, tag: &[u8]) -> Result<()> {
        match tag {
            b"volume" => self.in_volume = false,
            b"film" => self.in_film = false,
            b"transform" => self.in_transform = false,
            b"sensor" => {
                if self.in_sensor {
                    let projection = match self.sensor_type.as_deref() {
                        Some("orthographic") => Projection::Orthographic { scale: self.scale.unwrap_or(1.0) },
                        _ => Projection::Perspective { fov_degrees: self.fov_degrees.unwrap_or(DEFAULT_FOV_DEGREES) },
                    };
                    self.camera = Some(CameraSettings { projection, look_at: self.look_at.take() });
                }
                self.in_sensor = false;
                self.in_film = false;
                self.in_transform = false;
            }
            b"raymarch" => self.in_raymarch = false,
            b"transfer_function" => self.in_transfer_function = false,
            b"emitter" => {
                if self.in_emitter {
                    let intensity = self.intensity.unwrap_or(1.0);
                    let light = match self.emitter_type.as_deref() {
                        Some("directional") => LightParameters::directional(
                            self.direction.ok_or(VolumeError::MissingField("emitter.direction"))?,
                            intensity,
                        ),
                        Some("point") => LightParameters::point(
                            self.position.ok_or(VolumeError::MissingField("emitter.position"))?,
                            intensity,
                        ),
                        other => {
                            return Err(VolumeError::Settings(format!(
                                "unsupported emitter: {}",
                                other.unwrap_or("")
                            )))
                        }
                    };
                    self.lights.push(light);
                }
                self.in_emitter = false;
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<RenderSettings> {
        let path = self.volume_path.ok_or(VolumeError::MissingField("volume.filename"))?;

        let normalization = match self.normalization.as_deref().unwrap_or("type_range") {
            "type_range" | "type" => Normalization::TypeRange,
            "data_range" | "data" => Normalization::DataRange,
            "window" => Normalization::Window {
                min: self.window_min.ok_or(VolumeError::MissingField("volume.window_min"))?,
                max: self.window_max.ok_or(VolumeError::MissingField("volume.window_max"))?,
            },
            other => return Err(VolumeError::Settings(format!("unknown normalization: {}", other))),
        };
        let precision = match self.precision.as_deref().unwrap_or("auto") {
            "auto" => OutputPrecision::Auto,
            "float" => OutputPrecision::Float,
            other => return Err(VolumeError::Settings(format!("unknown precision: {}", other))),
        };
        let mut options = PackOptions { normalization, precision, ..PackOptions::default() };
        if let Some(chunk_bytes) = self.chunk_bytes {
            options.chunk_bytes = chunk_bytes;
        }

        let is_raw = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("raw"));
        let raw = if is_raw || self.raw_dimensions.is_some() {
            Some(RawLayout {
                dimensions: self.raw_dimensions.ok_or(VolumeError::MissingField("volume.dimensions"))?,
                element_type: self.raw_element_type.ok_or(VolumeError::MissingField("volume.element_type"))?,
                byte_order: if self.raw_big_endian { ByteOrder::Big } else { ByteOrder::Little },
                spacing: self.raw_spacing.unwrap_or_else(|| Vector3f::new(1.0, 1.0, 1.0)),
            })
        } else {
            None
        };

        let transfer_function = if self.has_transfer_function {
            TransferFunction::new(self.points)?
        } else {
            TransferFunction::grayscale()
        };
        let lights = if self.lights.is_empty() {
            vec![LightParameters::default()]
        } else {
            self.lights
        };
        for light in &lights {
            light.validate()?;
        }
        self.params.validate()?;
        if let Some(step) = self.illumination.step_size {
            if !(step.is_finite() && step > 0.0) {
                return Err(VolumeError::invalid("illumination.step_size", format!("{} must be positive", step)));
            }
        }

        Ok(RenderSettings {
            volume: VolumeSource { path, raw, options },
            camera: self.camera,
            width: self.width.unwrap_or(DEFAULT_RESOLUTION),
            height: self.height.unwrap_or(DEFAULT_RESOLUTION),
            raymarch: self.params,
            illumination: self.illumination,
            transfer_function,
            lights,
            background: self.background,
        })
    }

    fn resolve_path(&self, filename: &str) -> PathBuf {
        let path = Path::new(filename);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| VolumeError::Settings(format!("attribute '{}': {}", key, err)))?
            .into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

fn required<'a>(attrs: &'a HashMap<String, String>, field: &'static str, key: &str) -> Result<&'a String> {
    attrs.get(key).ok_or(VolumeError::MissingField(field))
}

fn optional<T>(attrs: &HashMap<String, String>, key: &str, parse: fn(&str) -> Result<T>) -> Result<Option<T>> {
    attrs.get(key).map(|v| parse(v)).transpose()
}

fn parse_clip_plane(attrs: &HashMap<String, String>) -> Result<ClipPlane> {
    let plane = match (attrs.get("normal"), attrs.get("center"), attrs.get("direction")) {
        (Some(normal), _, _) => ClipPlane::new(
            parse_vec3(normal)?,
            optional(attrs, "distance", parse_float)?.unwrap_or(0.0),
        ),
        (None, Some(center), Some(direction)) => {
            ClipPlane::from_point_direction(parse_vec3(center)?, parse_vec3(direction)?)
        }
        _ => return Err(VolumeError::MissingField("clip_plane.normal")),
    };
    if !plane.is_valid() {
        return Err(VolumeError::invalid("clip_plane", "normal must be non-zero"));
    }
    Ok(plane)
}

fn parse_float(value: &str) -> Result<Float> {
    value.trim().parse::<Float>().map_err(|_| VolumeError::Settings(format!("invalid float: {}", value)))
}

fn parse_f64(value: &str) -> Result<f64> {
    value.trim().parse::<f64>().map_err(|_| VolumeError::Settings(format!("invalid float: {}", value)))
}

fn parse_usize(value: &str) -> Result<usize> {
    value.trim().parse::<usize>().map_err(|_| VolumeError::Settings(format!("invalid integer: {}", value)))
}

fn parse_u64(value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| VolumeError::Settings(format!("invalid integer: {}", value)))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(VolumeError::Settings(format!("invalid boolean: {}", other))),
    }
}

fn parse_list<T: std::str::FromStr>(value: &str, count: usize) -> Result<Vec<T>> {
    let items = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|_| VolumeError::Settings(format!("invalid list item '{}' in '{}'", s, value))))
        .collect::<Result<Vec<T>>>()?;
    if items.len() != count {
        return Err(VolumeError::Settings(format!("expected {} values, got '{}'", count, value)));
    }
    Ok(items)
}

fn parse_vec3(value: &str) -> Result<Vector3f> {
    let v = parse_list::<Float>(value, 3)?;
    Ok(Vector3f::new(v[0], v[1], v[2]))
}

fn parse_vec4(value: &str) -> Result<Vector4f> {
    let v = parse_list::<Float>(value, 4)?;
    Ok(Vector4f::new(v[0], v[1], v[2], v[3]))
}
