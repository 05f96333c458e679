//! Character-level GPT decoder.
//!
//! Parameter names follow the nanoGPT layout (`transformer.wte`,
//! `transformer.h.{i}.attn.c_attn`, ...) so PyTorch state dicts load as-is.

use std::path::Path;

use candle_core::{DType, Device, IndexOp, Module, Result, Tensor};
use candle_nn::{embedding, linear_b, Embedding, LayerNorm, Linear, VarBuilder};

use super::ModelMeta;

const LAYER_NORM_EPS: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GptConfig {
    pub vocab_size: usize,
    pub block_size: usize,
    pub n_layer: usize,
    pub n_head: usize,
    pub n_embd: usize,
    pub bias: bool,
}

impl GptConfig {
    pub fn from_meta(meta: &ModelMeta, vocab_size: usize) -> Self {
        Self {
            vocab_size,
            block_size: meta.block_size,
            n_layer: meta.n_layer,
            n_head: meta.n_head,
            n_embd: meta.n_embd,
            bias: meta.bias,
        }
    }
}

fn layer_norm(size: usize, bias: bool, vb: VarBuilder) -> Result<LayerNorm> {
    let weight = vb.get(size, "weight")?;
    if bias {
        let bias = vb.get(size, "bias")?;
        Ok(LayerNorm::new(weight, bias, LAYER_NORM_EPS))
    } else {
        Ok(LayerNorm::new_no_bias(weight, LAYER_NORM_EPS))
    }
}

fn causal_mask(t: usize, device: &Device) -> Result<Tensor> {
    let mask: Vec<u8> = (0..t)
        .flat_map(|i| (0..t).map(move |j| u8::from(j > i)))
        .collect();
    Tensor::from_slice(&mask, (t, t), device)
}

fn masked_fill(on_false: &Tensor, mask: &Tensor, value: f32) -> Result<Tensor> {
    let on_true = Tensor::new(value, on_false.device())?.broadcast_as(mask.shape().dims())?;
    mask.where_cond(&on_true, on_false)
}

struct CausalSelfAttention {
    c_attn: Linear,
    c_proj: Linear,
    n_head: usize,
    n_embd: usize,
}

impl CausalSelfAttention {
    fn new(config: &GptConfig, vb: VarBuilder) -> Result<Self> {
        let c_attn = linear_b(config.n_embd, 3 * config.n_embd, config.bias, vb.pp("c_attn"))?;
        let c_proj = linear_b(config.n_embd, config.n_embd, config.bias, vb.pp("c_proj"))?;
        Ok(Self {
            c_attn,
            c_proj,
            n_head: config.n_head,
            n_embd: config.n_embd,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (b, t, c) = x.dims3()?;
        let head_size = self.n_embd / self.n_head;

        let qkv = self.c_attn.forward(x)?;
        let split = |i: usize| -> Result<Tensor> {
            qkv.narrow(2, i * c, c)?
                .reshape((b, t, self.n_head, head_size))?
                .transpose(1, 2)?
                .contiguous()
        };
        let (q, k, v) = (split(0)?, split(1)?, split(2)?);

        let scale = 1.0 / (head_size as f64).sqrt();
        let att = (q.matmul(&k.t()?.contiguous()?)? * scale)?;
        let mask = causal_mask(t, x.device())?.broadcast_as(att.dims())?;
        let att = masked_fill(&att, &mask, f32::NEG_INFINITY)?;
        let att = candle_nn::ops::softmax_last_dim(&att)?;

        let y = att
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, t, c))?;
        self.c_proj.forward(&y)
    }
}

struct Mlp {
    c_fc: Linear,
    c_proj: Linear,
}

impl Mlp {
    fn new(config: &GptConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            c_fc: linear_b(config.n_embd, 4 * config.n_embd, config.bias, vb.pp("c_fc"))?,
            c_proj: linear_b(4 * config.n_embd, config.n_embd, config.bias, vb.pp("c_proj"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.c_proj.forward(&self.c_fc.forward(x)?.gelu_erf()?)
    }
}

struct Block {
    ln_1: LayerNorm,
    attn: CausalSelfAttention,
    ln_2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn new(config: &GptConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            ln_1: layer_norm(config.n_embd, config.bias, vb.pp("ln_1"))?,
            attn: CausalSelfAttention::new(config, vb.pp("attn"))?,
            ln_2: layer_norm(config.n_embd, config.bias, vb.pp("ln_2"))?,
            mlp: Mlp::new(config, vb.pp("mlp"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = (x + self.attn.forward(&self.ln_1.forward(x)?)?)?;
        let mlp = self.mlp.forward(&self.ln_2.forward(&x)?)?;
        x + mlp
    }
}

pub struct Gpt {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    lm_head: Linear,
    config: GptConfig,
}

impl Gpt {
    pub fn new(config: GptConfig, vb: VarBuilder) -> Result<Self> {
        if config.n_head == 0 || config.n_embd % config.n_head != 0 {
            candle_core::bail!(
                "n_embd ({}) must be a multiple of n_head ({})",
                config.n_embd,
                config.n_head
            );
        }

        let t = vb.pp("transformer");
        let wte = embedding(config.vocab_size, config.n_embd, t.pp("wte"))?;
        let wpe = embedding(config.block_size, config.n_embd, t.pp("wpe"))?;
        let blocks = (0..config.n_layer)
            .map(|i| Block::new(&config, t.pp(format!("h.{i}"))))
            .collect::<Result<Vec<_>>>()?;
        let ln_f = layer_norm(config.n_embd, config.bias, t.pp("ln_f"))?;

        // nanoGPT ties lm_head to the token embedding.
        let lm_head = if vb.contains_tensor("lm_head.weight") {
            linear_b(config.n_embd, config.vocab_size, false, vb.pp("lm_head"))?
        } else {
            Linear::new(wte.embeddings().clone(), None)
        };

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            lm_head,
            config,
        })
    }

    /// Loads `.safetensors` weights, or a PyTorch state dict for any other extension.
    pub fn load(path: &Path, config: GptConfig, device: &Device) -> Result<Self> {
        let vb = match path.extension().and_then(|e| e.to_str()) {
            Some("safetensors") => {
                VarBuilder::from_buffered_safetensors(std::fs::read(path)?, DType::F32, device)?
            }
            _ => VarBuilder::from_pth(path, DType::F32, device)?,
        };
        Self::new(config, vb)
    }

    pub fn config(&self) -> &GptConfig {
        &self.config
    }

    /// Next-token logits for every sequence in `idx` (`[batch, time]`, u32),
    /// shaped `[batch, vocab_size]`. `time` must not exceed `block_size`.
    pub fn forward(&self, idx: &Tensor) -> Result<Tensor> {
        let (_b, t) = idx.dims2()?;
        if t == 0 || t > self.config.block_size {
            candle_core::bail!(
                "sequence length {t} outside 1..={}",
                self.config.block_size
            );
        }

        let tok = self.wte.forward(idx)?;
        let pos = Tensor::arange(0u32, t as u32, idx.device())?;
        let pos = self.wpe.forward(&pos)?;
        let mut x = tok.broadcast_add(&pos)?;
        for block in &self.blocks {
            x = block.forward(&x)?;
        }
        let x = self.ln_f.forward(&x)?;
        let last = x.i((.., t - 1, ..))?.contiguous()?;
        self.lm_head.forward(&last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> GptConfig {
        GptConfig {
            vocab_size: 5,
            block_size: 4,
            n_layer: 2,
            n_head: 2,
            n_embd: 8,
            bias: true,
        }
    }

    #[test]
    fn test_forward_shape() {
        let device = Device::Cpu;
        let model = Gpt::new(tiny_config(), VarBuilder::zeros(DType::F32, &device)).unwrap();

        let idx = Tensor::new(&[[0u32, 1, 2], [3, 4, 0]], &device).unwrap();
        let logits = model.forward(&idx).unwrap();

        assert_eq!(logits.dims(), &[2, 5]);
    }

    #[test]
    fn test_forward_rejects_overlong_context() {
        let device = Device::Cpu;
        let model = Gpt::new(tiny_config(), VarBuilder::zeros(DType::F32, &device)).unwrap();

        let idx = Tensor::new(&[[0u32, 1, 2, 3, 4]], &device).unwrap();
        assert!(model.forward(&idx).is_err());
    }

    #[test]
    fn test_new_rejects_uneven_heads() {
        let config = GptConfig {
            n_head: 3,
            ..tiny_config()
        };
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        assert!(Gpt::new(config, vb).is_err());
    }

    #[test]
    fn test_load_safetensors_round_trips_weights() {
        let device = Device::Cpu;
        let varmap = candle_nn::VarMap::new();
        let trained = Gpt::new(
            tiny_config(),
            VarBuilder::from_varmap(&varmap, DType::F32, &device),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        varmap.save(&path).unwrap();

        let loaded = Gpt::load(&path, tiny_config(), &device).unwrap();

        let idx = Tensor::new(&[[1u32, 2, 3]], &device).unwrap();
        let expected: Vec<Vec<f32>> = trained.forward(&idx).unwrap().to_vec2().unwrap();
        let actual: Vec<Vec<f32>> = loaded.forward(&idx).unwrap().to_vec2().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_causal_mask_hides_future_positions() {
        let mask = causal_mask(3, &Device::Cpu).unwrap();
        let rows: Vec<Vec<u8>> = mask.to_vec2().unwrap();
        assert_eq!(rows, vec![vec![0, 1, 1], vec![0, 0, 1], vec![0, 0, 0]]);
    }
}
