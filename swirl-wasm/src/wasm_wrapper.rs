use crate::requests::{Deferred, Request};
use crate::space::client_to_device;
use gloo_utils::format::JsValueSerdeExt;
use std::cell::RefCell;
use std::rc::Rc;
use swirl::{PointerEvent, Settings, PRIMARY_POINTER_ID};

use wasm_bindgen::prelude::*;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::Window;

// Pointer events wait here, with their timestamps, until the next frame.
type EventQueue = Rc<RefCell<Vec<(PointerEvent, f64)>>>;

#[wasm_bindgen]
pub struct Swirl {
    canvas: web_sys::HtmlCanvasElement,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    events: EventQueue,
    listeners: Vec<Listener>,
    requests: Deferred,
    logical_width: u32,
    logical_height: u32,
    pixel_ratio: f64,
    instance: Rc<RefCell<swirl::Swirl>>,
}

#[wasm_bindgen]
impl Swirl {
    #[wasm_bindgen(constructor)]
    pub async fn new(canvas_id: String, settings_object: JsValue) -> Result<Swirl, JsValue> {
        let _ = console_log::init_with_level(log::Level::Debug);

        set_panic_hook();

        let settings: Settings = if settings_object.is_undefined() || settings_object.is_null() {
            Settings::default()
        } else {
            settings_object
                .into_serde()
                .map_err(|err| JsValue::from_str(&err.to_string()))?
        };

        let window = window()?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("The window has no document"))?;
        let canvas = document
            .get_element_by_id(&canvas_id)
            .ok_or_else(|| {
                JsValue::from_str(&format!(
                    "I expected to find a canvas element with id `{}`",
                    canvas_id
                ))
            })?
            .dyn_into::<web_sys::HtmlCanvasElement>()
            .map_err(|_| JsValue::from_str(&format!("`{}` is not a canvas", canvas_id)))?;

        let pixel_ratio: f64 = window.device_pixel_ratio();
        let logical_width = canvas.client_width().max(0) as u32;
        let logical_height = canvas.client_height().max(0) as u32;
        let (physical_width, physical_height) =
            physical_from_logical_size(logical_width, logical_height, pixel_ratio);
        canvas.set_width(physical_width);
        canvas.set_height(physical_height);

        let wgpu_instance = wgpu::Instance::default();
        let surface = wgpu_instance
            .create_surface(wgpu::SurfaceTarget::Canvas(canvas.clone()))
            .map_err(to_js)?;

        let context = swirl::request_context(&wgpu_instance, Some(&surface))
            .await
            .map_err(to_js)?;
        let capabilities = swirl::Capabilities::probe(&context.adapter, &context.device)
            .await
            .map_err(to_js)?;

        let swapchain_capabilities = surface.get_capabilities(&context.adapter);
        let swapchain_format = swapchain_capabilities
            .formats
            .first()
            .copied()
            .ok_or_else(|| JsValue::from_str("The canvas has no usable formats"))?;
        log::debug!("Swapchain format: {:?}", swapchain_format);

        let alpha_mode = if settings.transparent
            && swapchain_capabilities
                .alpha_modes
                .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            wgpu::CompositeAlphaMode::Auto
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: swapchain_format,
            width: physical_width.max(1),
            height: physical_height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&context.device, &config);

        let instance = swirl::Swirl::new(
            &context.device,
            &capabilities,
            swapchain_format,
            physical_width,
            physical_height,
            &settings,
        )
        .await;

        let events = EventQueue::default();
        let container = instance
            .settings()
            .container_id
            .as_deref()
            .and_then(|id| document.get_element_by_id(id));
        let listeners = attach_listeners(&window, container, &canvas, pixel_ratio, &events)?;

        Ok(Self {
            canvas,
            device: context.device,
            queue: context.queue,
            surface,
            config,
            events,
            listeners,
            requests: Deferred::default(),
            logical_width,
            logical_height,
            pixel_ratio,
            instance: Rc::new(RefCell::new(instance)),
        })
    }

    pub fn animate(&mut self, timestamp: f64) {
        // A capture is still reading back.
        let Ok(mut instance) = self.instance.try_borrow_mut() else {
            return;
        };

        for request in self.requests.drain() {
            apply(&mut instance, request);
        }

        for (event, time) in self.events.borrow_mut().drain(..) {
            instance.handle_pointer(event, time);
        }

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return;
            }
            Err(err) => {
                log::warn!("Skipping frame: {}", err);
                return;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("swirl:render"),
            });

        instance.animate(&self.device, &mut encoder, &view, timestamp);

        self.queue.submit(Some(encoder.finish()));
        frame.present();
    }

    pub fn resize(&mut self, logical_width: u32, logical_height: u32) {
        if (self.logical_width != logical_width) || (self.logical_height != logical_height) {
            let (physical_width, physical_height) =
                physical_from_logical_size(logical_width, logical_height, self.pixel_ratio);

            self.canvas.set_width(physical_width);
            self.canvas.set_height(physical_height);

            self.config.width = physical_width.max(1);
            self.config.height = physical_height.max(1);
            self.surface.configure(&self.device, &self.config);

            self.requests.submit(
                &self.instance,
                Request::Resize {
                    width: physical_width,
                    height: physical_height,
                },
                apply,
            );

            self.logical_width = logical_width;
            self.logical_height = logical_height;
        }
    }

    pub fn splat_burst(&mut self, count: u32) {
        self.requests
            .submit(&self.instance, Request::Burst(count), apply);
    }

    #[wasm_bindgen(setter)]
    pub fn set_paused(&mut self, paused: bool) {
        self.requests
            .submit(&self.instance, Request::Pause(paused), apply);
    }

    /// Resolves to the PNG bytes of the current frame at `captureResolution`.
    pub fn capture_png(&self) -> js_sys::Promise {
        let instance = Rc::clone(&self.instance);
        let device = self.device.clone();
        let queue = self.queue.clone();

        wasm_bindgen_futures::future_to_promise(async move {
            let image = {
                let mut instance = instance
                    .try_borrow_mut()
                    .map_err(|_| JsValue::from_str("A capture is already running"))?;
                instance.capture(&device, &queue).await.map_err(to_js)?
            };

            let mut bytes = Vec::new();
            image
                .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
                .map_err(to_js)?;

            Ok(js_sys::Uint8Array::from(bytes.as_slice()).into())
        })
    }

    /// Remove the DOM listeners and free the GPU resources.
    pub fn destroy(self) {
        for listener in self.listeners {
            listener.remove();
        }

        match Rc::try_unwrap(self.instance) {
            Ok(instance) => instance.into_inner().destroy(),
            Err(_) => log::warn!("A capture is still running. Leaving the textures to the GC."),
        }
    }
}

fn apply(instance: &mut swirl::Swirl, request: Request) {
    match request {
        Request::Resize { width, height } => instance.resize(width, height),
        Request::Burst(count) => instance.random_splats(count),
        Request::Pause(paused) => instance.set_paused(paused),
    }
}

struct Listener {
    target: web_sys::EventTarget,
    kind: &'static str,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

impl Listener {
    fn new(
        target: &web_sys::EventTarget,
        kind: &'static str,
        callback: impl FnMut(web_sys::Event) + 'static,
    ) -> Result<Self, JsValue> {
        let callback = Closure::<dyn FnMut(web_sys::Event)>::new(callback);
        target.add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref())?;

        Ok(Self {
            target: target.clone(),
            kind,
            callback,
        })
    }

    fn remove(self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.callback.as_ref().unchecked_ref());
    }
}

// Maps client coordinates into device pixels relative to `origin`.
#[derive(Clone)]
struct PointerSpace {
    origin: web_sys::Element,
    pixel_ratio: f64,
}

impl PointerSpace {
    fn to_device(&self, client_x: i32, client_y: i32) -> (f32, f32) {
        let rect = self.origin.get_bounding_client_rect();
        client_to_device(client_x, client_y, (rect.left(), rect.top()), self.pixel_ratio)
    }
}

// Without a container, events are taken from the whole window but still
// measured from the canvas.
fn attach_listeners(
    window: &Window,
    container: Option<web_sys::Element>,
    canvas: &web_sys::HtmlCanvasElement,
    pixel_ratio: f64,
    events: &EventQueue,
) -> Result<Vec<Listener>, JsValue> {
    let (target, origin): (web_sys::EventTarget, web_sys::Element) = match container {
        Some(element) => (element.clone().into(), element),
        None => (window.clone().into(), canvas.clone().into()),
    };
    let space = PointerSpace {
        origin,
        pixel_ratio,
    };

    let mut listeners = Vec::new();

    for kind in ["mousedown", "mousemove", "mouseup"] {
        let events = Rc::clone(events);
        let space = space.clone();
        listeners.push(Listener::new(&target, kind, move |event| {
            let Some(event) = event.dyn_ref::<web_sys::MouseEvent>() else {
                return;
            };
            let id = PRIMARY_POINTER_ID;
            let (x, y) = space.to_device(event.client_x(), event.client_y());
            let pointer_event = match kind {
                "mousedown" => PointerEvent::Down { id, x, y },
                "mousemove" => PointerEvent::Move { id, x, y },
                _ => PointerEvent::Up { id },
            };
            events
                .borrow_mut()
                .push((pointer_event, event.time_stamp()));
        })?);
    }

    for kind in ["touchstart", "touchmove", "touchend", "touchcancel"] {
        let events = Rc::clone(events);
        let space = space.clone();
        listeners.push(Listener::new(&target, kind, move |event| {
            let Some(event) = event.dyn_ref::<web_sys::TouchEvent>() else {
                return;
            };
            let touches = event.changed_touches();
            let mut queue = events.borrow_mut();
            for index in 0..touches.length() {
                let Some(touch) = touches.get(index) else {
                    continue;
                };
                let id = i64::from(touch.identifier());
                let (x, y) = space.to_device(touch.client_x(), touch.client_y());
                let pointer_event = match kind {
                    "touchstart" => PointerEvent::Down { id, x, y },
                    "touchmove" => PointerEvent::Move { id, x, y },
                    _ => PointerEvent::Up { id },
                };
                queue.push((pointer_event, event.time_stamp()));
            }
        })?);
    }

    Ok(listeners)
}

pub fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("The global `window` doesn’t exist"))
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

// https://github.com/rustwasm/console_error_panic_hook#readme
pub fn set_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn physical_from_logical_size(
    logical_width: u32,
    logical_height: u32,
    pixel_ratio: f64,
) -> (u32, u32) {
    (
        (pixel_ratio * f64::from(logical_width)) as u32,
        (pixel_ratio * f64::from(logical_height)) as u32,
    )
}
